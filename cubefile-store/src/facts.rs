use crate::chunkid::ChunkId;
use cubefile_base::{err, Context, Result};
use std::io::{BufRead, Seek, SeekFrom};

// The fact-value stream is plain text. Everything up to a line reading
// `VALUES_START` is schema material and skipped. After it come lines of
//
//     <chunk-id> <value_1> ... <value_n>
//
// separated by whitespace, until `VALUES_END` or the end of the stream.
// Every scan starts over from the top, so a single cursor serves all the
// chunks of a cube in turn.

pub const VALUES_START: &str = "VALUES_START";
pub const VALUES_END: &str = "VALUES_END";

#[derive(Clone, Debug, PartialEq)]
pub struct FactRecord {
    pub id: ChunkId,
    pub values: Vec<f32>,
}

pub struct FactStream<R> {
    rd: R,
    num_measures: usize,
    line: String,
    lineno: usize,
    in_values: bool,
}

impl<R: BufRead + Seek> FactStream<R> {
    pub fn new(rd: R, num_measures: usize) -> Self {
        FactStream {
            rd,
            num_measures,
            line: String::new(),
            lineno: 0,
            in_values: false,
        }
    }

    pub fn num_measures(&self) -> usize {
        self.num_measures
    }

    pub fn into_inner(self) -> R {
        self.rd
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self
            .rd
            .read_line(&mut self.line)
            .context(format!("reading fact stream line {}", self.lineno + 1))?;
        self.lineno += 1;
        Ok(n > 0)
    }

    // Positions the cursor on the first value line.
    pub fn rewind(&mut self) -> Result<()> {
        self.rd.seek(SeekFrom::Start(0))?;
        self.lineno = 0;
        self.in_values = false;
        while self.read_line()? {
            if self.line.trim() == VALUES_START {
                self.in_values = true;
                return Ok(());
            }
        }
        Err(err(format!("fact stream has no {} marker", VALUES_START)))
    }

    pub fn next_record(&mut self) -> Result<Option<FactRecord>> {
        if !self.in_values {
            return Ok(None);
        }
        loop {
            if !self.read_line()? {
                self.in_values = false;
                return Ok(None);
            }
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            if line == VALUES_END {
                self.in_values = false;
                return Ok(None);
            }
            let mut fields = line.split_ascii_whitespace();
            let id = match fields.next() {
                Some(id) => ChunkId::new(id),
                None => continue,
            };
            let mut values = Vec::with_capacity(self.num_measures);
            for f in fields {
                let v = f
                    .parse::<f32>()
                    .context(format!("bad value {:?} on fact line {}", f, self.lineno))?;
                values.push(v);
            }
            if values.len() != self.num_measures {
                return Err(err(format!(
                    "fact line {} for {} has {} values, expected {}",
                    self.lineno,
                    id,
                    values.len(),
                    self.num_measures
                )));
            }
            return Ok(Some(FactRecord { id, values }));
        }
    }

    // The facts of the cells directly below `prefix`.
    pub fn values_under(&mut self, prefix: &ChunkId) -> Result<Vec<FactRecord>> {
        let depth = prefix.depth()? + 1;
        let mut found = Vec::new();
        self.rewind()?;
        while let Some(rec) = self.next_record()? {
            if prefix.is_prefix_of(&rec.id) && rec.id.depth()? == depth {
                found.push(rec);
            }
        }
        Ok(found)
    }
}
