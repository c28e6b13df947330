//! Tests for error reporting

use kinsight_core::error::{Inconsistency, InsightError, InsightResult};
use kinsight_core::types::Address;

#[test]
fn test_error_display()
{
    let error = InsightError::Unreadable {
        image: 1,
        address: Address::new(0x1000),
        length: 8,
    };
    let message = error.to_string();
    assert!(message.contains("8 bytes"));
    assert!(message.contains("0x0000000000001000"));
    assert!(message.contains("image 1"));
    assert!(error.is_unreadable());

    let error = InsightError::AmbiguousMember {
        member: "payload".to_string(),
        candidates: 3,
    };
    assert!(error.to_string().contains("payload"));
    assert!(!error.is_unreadable());

    let error = InsightError::InvalidImage { index: 4, count: 2 };
    assert!(error.to_string().contains('4'));
}

#[test]
fn test_parse_error_names_input()
{
    let error = Address::parse("0xzz").unwrap_err();
    assert!(error.to_string().contains("0xzz"));
    assert!(error.to_string().contains("'z'"));
}

#[test]
fn test_inconsistency_conversion()
{
    let inconsistency = Inconsistency::new(Address::new(0x2000), "link visited twice");
    assert_eq!(inconsistency.to_string(), "link visited twice @ 0x0000000000002000");

    let error: InsightError = inconsistency.clone().into();
    match error {
        InsightError::InconsistentStructure(inner) => assert_eq!(inner, inconsistency),
        other => panic!("expected InconsistentStructure, got {other:?}"),
    }
}

#[test]
fn test_io_error_conversion()
{
    fn load() -> InsightResult<()>
    {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "vmcore missing"))?;
        Ok(())
    }

    let error = load().unwrap_err();
    assert!(matches!(error, InsightError::Io(_)));
    assert!(error.to_string().contains("vmcore missing"));
}

#[test]
fn test_missing_snapshot_file()
{
    let result = kinsight_core::SnapshotImage::from_raw_file("vmcore", "/nonexistent/kinsight/vmcore", Address::ZERO);
    assert!(matches!(result, Err(InsightError::Io(_))));
}
