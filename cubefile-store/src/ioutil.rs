use funty::Numeric;
use std::ops::Range;
use cubefile_base::{err, Result};

// Little-endian byte cursors over an in-memory page image. The writer can
// optionally record a dotted context path for every range it writes, which
// renders as an annotated hexdump when debugging a layout.

pub(crate) struct Annotations {
    context: Vec<String>,
    annotations: Vec<(Range<usize>, Vec<String>)>,
}

impl Annotations {
    fn new() -> Self {
        Annotations {
            context: Vec::new(),
            annotations: Vec::new(),
        }
    }

    fn annotate(&mut self, range: Range<usize>, name: &str) {
        let mut ctx = self.context.clone();
        ctx.push(name.to_string());
        self.annotations.push((range, ctx));
    }

    fn render_hexdump(&self, buf: &[u8]) -> Result<String> {
        use std::fmt::Write;
        let mut s = String::new();
        let mut pos = 0;
        let mut sorted: Vec<&(Range<usize>, Vec<String>)> = self.annotations.iter().collect();
        sorted.sort_by_key(|(r, _)| r.start);
        for (r, name) in sorted {
            if r.is_empty() {
                continue;
            }
            let name = name.join(".");
            if r.start < pos {
                writeln!(s, "- ERROR: overlapping range for {}", name)?;
            }
            if r.start > pos {
                writeln!(s, "- (unannotated, {} bytes)", r.start - pos)?;
            }
            pos = r.end;
            writeln!(s, "- {} ({} bytes):", name, r.len())?;
            let bytes = buf
                .get(r.clone())
                .ok_or_else(|| err("annotation past end of buffer"))?;
            for (n, line) in bytes.chunks(16).enumerate() {
                write!(s, "\t {:08.8x} |", r.start + (n * 16))?;
                for group in line.chunks(4) {
                    s += "  ";
                    for byte in group {
                        write!(s, " {:02.2x}", byte)?;
                    }
                }
                writeln!(s)?;
            }
        }
        if pos < buf.len() {
            writeln!(s, "- (unannotated tail, {} bytes)", buf.len() - pos)?;
        }
        Ok(s)
    }
}

pub(crate) struct ByteWriter {
    buf: Vec<u8>,
    annotations: Option<Annotations>,
}

impl ByteWriter {
    pub(crate) fn new(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
            annotations: None,
        }
    }

    pub(crate) fn annotated(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
            annotations: Some(Annotations::new()),
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn push_context<T: ToString>(&mut self, context: T) {
        if let Some(a) = self.annotations.as_mut() {
            a.context.push(context.to_string());
        }
    }

    pub(crate) fn pop_context(&mut self) {
        if let Some(a) = self.annotations.as_mut() {
            a.context.pop();
        }
    }

    fn annotate(&mut self, start: usize, name: &str) {
        let end = self.buf.len();
        if let Some(a) = self.annotations.as_mut() {
            a.annotate(start..end, name);
        }
    }

    pub(crate) fn write_annotated_le_num<T>(&mut self, name: &str, val: T)
    where
        T: Numeric,
        T::Bytes: AsRef<[u8]>,
    {
        let start = self.pos();
        self.buf.extend_from_slice(val.to_le_bytes().as_ref());
        self.annotate(start, name);
    }

    pub(crate) fn write_annotated_le_num_slice<T>(&mut self, name: &str, vals: &[T])
    where
        T: Numeric,
        T::Bytes: AsRef<[u8]>,
    {
        let start = self.pos();
        for &v in vals {
            self.buf.extend_from_slice(v.to_le_bytes().as_ref());
        }
        self.annotate(start, name);
    }

    // Overwrites a number written earlier, for offsets only known once
    // the bytes they point at have been laid down.
    pub(crate) fn patch_le_num<T>(&mut self, pos: usize, val: T) -> Result<()>
    where
        T: Numeric,
        T::Bytes: AsRef<[u8]>,
    {
        let bytes = val.to_le_bytes();
        let bytes = bytes.as_ref();
        let dst = self
            .buf
            .get_mut(pos..pos + bytes.len())
            .ok_or_else(|| err("patch position past end of buffer"))?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn pad_to(&mut self, name: &str, len: usize) -> Result<()> {
        if self.buf.len() > len {
            return Err(err(format!(
                "image of {} bytes exceeds {} byte limit",
                self.buf.len(),
                len
            )));
        }
        let start = self.pos();
        self.buf.resize(len, 0);
        self.annotate(start, name);
        Ok(())
    }

    pub(crate) fn is_annotated(&self) -> bool {
        self.annotations.is_some()
    }

    pub(crate) fn render_annotations(&self) -> Result<String> {
        match &self.annotations {
            Some(a) => a.render_hexdump(&self.buf),
            None => Err(err("writer was not annotating")),
        }
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(err(format!("seek to {} past end of {} byte buffer", pos, self.buf.len())));
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn read_le_num<T>(&mut self) -> Result<T>
    where
        T: Numeric,
        T::Bytes: Default + AsMut<[u8]>,
    {
        let mut bytes = T::Bytes::default();
        let dst = bytes.as_mut();
        let end = self.pos + dst.len();
        let src = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| err("read past end of buffer"))?;
        dst.copy_from_slice(src);
        self.pos = end;
        Ok(T::from_le_bytes(bytes))
    }

    pub(crate) fn read_le_num_vec<T>(&mut self, n: usize) -> Result<Vec<T>>
    where
        T: Numeric,
        T::Bytes: Default + AsMut<[u8]>,
    {
        let mut vals = Vec::new();
        vals.try_reserve_exact(n)?;
        for _ in 0..n {
            vals.push(self.read_le_num()?);
        }
        Ok(vals)
    }
}
