use binread::{
    io::{Read, Seek},
    BinRead, BinReaderExt,
};
use std::io::Write;

use crate::error::MsbError;

/// A fixed-layout packed record with a validation predicate.
///
/// Records decode with [BinRead] and encode with [Record::put]. Validation
/// runs after every decode and before every encode, so malformed headers
/// are rejected in both directions.
pub(crate) trait Record: BinRead<Args = ()> {
    const NAME: &'static str;
    const SIZE: u32;

    /// Checks pad fields, forbidden values, and obvious bounds.
    /// `offset` is the record's position in the file, for error reporting.
    fn validate(&self, offset: u64) -> Result<(), MsbError>;

    /// Writes the record's byte representation.
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()>;
}

/// Reads a record and runs its validation predicate.
pub(crate) fn read_record<T: Record, R: Read + Seek>(reader: &mut R) -> Result<T, MsbError> {
    let offset = reader.stream_position()?;
    let record: T = reader.read_le()?;
    record.validate(offset)?;
    Ok(record)
}

/// Validates a record, then writes it at the current position.
pub(crate) fn write_record<T: Record, W: Write + Seek>(
    writer: &mut W,
    record: &T,
) -> Result<(), MsbError> {
    let offset = writer.stream_position()?;
    record.validate(offset)?;
    record.put(writer)?;
    Ok(())
}

pub(crate) fn expect_zero(
    record: &'static str,
    field: &'static str,
    offset: u64,
    value: i64,
) -> Result<(), MsbError> {
    if value != 0 {
        return Err(MsbError::Validation {
            record,
            field,
            offset,
            reason: format!("expected 0, found {value}"),
        });
    }
    Ok(())
}

pub(crate) fn expect_positive(
    record: &'static str,
    field: &'static str,
    offset: u64,
    value: i64,
) -> Result<(), MsbError> {
    if value <= 0 {
        return Err(MsbError::Validation {
            record,
            field,
            offset,
            reason: format!("expected a positive offset, found {value}"),
        });
    }
    Ok(())
}

pub(crate) fn expect_non_negative(
    record: &'static str,
    field: &'static str,
    offset: u64,
    value: i64,
) -> Result<(), MsbError> {
    if value < 0 {
        return Err(MsbError::Validation {
            record,
            field,
            offset,
            reason: format!("expected a non-negative offset, found {value}"),
        });
    }
    Ok(())
}

pub(crate) fn expect_eq(
    record: &'static str,
    field: &'static str,
    offset: u64,
    expected: i64,
    found: i64,
) -> Result<(), MsbError> {
    if found != expected {
        return Err(MsbError::Validation {
            record,
            field,
            offset,
            reason: format!("expected {expected}, found {found}"),
        });
    }
    Ok(())
}
