use crate::chunkid::{ChunkId, Coordinates, MIN_DEPTH, PSEUDO_CODE};
use cubefile_base::Result;
use test_log::test;

#[test]
fn test_depth() -> Result<()> {
    assert_eq!(ChunkId::root().depth()?, MIN_DEPTH);
    assert_eq!(ChunkId::new("0|1").depth()?, 1);
    assert_eq!(ChunkId::new("0|1.2|3.4|5").depth()?, 3);
    assert!(ChunkId::new("").depth().is_err());
    Ok(())
}

#[test]
fn test_num_dims() -> Result<()> {
    assert_eq!(ChunkId::root().num_dims()?, 0);
    assert_eq!(ChunkId::new("0|1|-1.2|3|0").num_dims()?, 3);
    assert_eq!(ChunkId::new("7").num_dims()?, 1);
    assert!(ChunkId::new("0|1.2").num_dims().is_err());
    Ok(())
}

#[test]
fn test_extract_coords() -> Result<()> {
    let id = ChunkId::new("0|2.1|-1|5");
    assert_eq!(id.extract_coords()?.as_slice(), &[1, PSEUDO_CODE, 5]);
    assert!(id.extract_coords()?.has_pseudo());
    assert!(ChunkId::root().extract_coords().is_err());
    assert!(ChunkId::new("0|x").extract_coords().is_err());
    assert!(ChunkId::new("0|-2").extract_coords().is_err());
    Ok(())
}

#[test]
fn test_domain_round_trip() -> Result<()> {
    for cid in ["3", "0|1", "0|1.2|3", "4|-1|2.0|0|0.11|7|123"] {
        let id = ChunkId::new(cid);
        let domain = id.extract_coords()?.to_domain();
        assert_eq!(domain, id.last_domain()?);
    }
    for coords in [vec![], vec![0], vec![5, 0, 17], vec![1, 2, 3, 4, 5, 6]] {
        let c = Coordinates::new(coords);
        assert_eq!(Coordinates::from_domain(&c.to_domain())?, c);
    }
    assert_eq!(Coordinates::default().to_domain(), "");
    assert!(Coordinates::from_domain("")?.is_empty());
    Ok(())
}

#[test]
fn test_add_suffix_domain() -> Result<()> {
    let mut id = ChunkId::root();
    id.add_suffix_domain("0|1")?;
    assert_eq!(id.as_str(), "0|1");
    id.add_suffix_domain("2|3")?;
    assert_eq!(id.as_str(), "0|1.2|3");
    assert!(id.add_suffix_domain("4").is_err());
    assert!(id.add_suffix_domain("4|5|6").is_err());
    assert!(id.add_suffix_domain("4.5|6").is_err());
    assert_eq!(id.as_str(), "0|1.2|3");
    let child = id.child(&Coordinates::new(vec![-1, 9]))?;
    assert_eq!(child.as_str(), "0|1.2|3.-1|9");
    Ok(())
}

#[test]
fn test_ancestry() -> Result<()> {
    let id = ChunkId::new("0|1.2|3.4|5");
    assert_eq!(id.parent()?.as_str(), "0|1.2|3");
    assert_eq!(ChunkId::new("0|1").parent()?, ChunkId::root());
    assert!(ChunkId::root().parent().is_err());
    assert_eq!(id.prefix(0)?, ChunkId::root());
    assert_eq!(id.prefix(1)?.as_str(), "0|1");
    assert_eq!(id.prefix(3)?, id);
    assert!(id.prefix(4).is_err());
    assert_eq!(id.domain_at(2)?, "2|3");
    assert!(id.domain_at(0).is_err());

    assert!(ChunkId::root().is_prefix_of(&id));
    assert!(ChunkId::new("0|1").is_prefix_of(&id));
    assert!(!ChunkId::new("0|1").is_prefix_of(&ChunkId::new("0|11.2|3")));
    assert!(!id.is_prefix_of(&id));
    Ok(())
}
