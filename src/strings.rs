use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, Write};

use crate::error::MsbError;

/// Reads a null-terminated UTF-16LE string, leaving the cursor just past
/// the terminator.
///
/// An embedded null always terminates the string, even if the surrounding
/// layout reserved more bytes for it.
pub(crate) fn read_utf16<R: Read + Seek>(reader: &mut R) -> Result<String, MsbError> {
    let start = reader.stream_position()?;
    let mut units = Vec::new();
    loop {
        let unit = match reader.read_u16::<LittleEndian>() {
            Ok(unit) => unit,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(MsbError::format(start, "string is not null-terminated"));
            }
            Err(e) => return Err(e.into()),
        };
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| MsbError::format(start, "string is not valid UTF-16"))
}

/// Writes `value` as null-terminated UTF-16LE.
pub(crate) fn write_utf16<W: Write>(writer: &mut W, value: &str) -> Result<(), MsbError> {
    if value.contains('\0') {
        return Err(MsbError::invariant(format!(
            "string {value:?} contains an embedded null and cannot be written"
        )));
    }
    for unit in value.encode_utf16() {
        writer.write_u16::<LittleEndian>(unit)?;
    }
    writer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn read_utf16_string() {
        let mut reader = Cursor::new(hex!("6D00 3000 3000 3000 0000 FFFF"));
        assert_eq!("m000", read_utf16(&mut reader).unwrap());

        // The cursor stops just past the terminator.
        assert_eq!(10, reader.position());
    }

    #[test]
    fn read_utf16_empty() {
        let mut reader = Cursor::new(hex!("0000 6D00"));
        assert_eq!("", read_utf16(&mut reader).unwrap());
        assert_eq!(2, reader.position());
    }

    #[test]
    fn read_utf16_embedded_null_terminates() {
        // Only the text before the first null code unit is kept.
        let mut reader = Cursor::new(hex!("6100 0000 6200 0000"));
        assert_eq!("a", read_utf16(&mut reader).unwrap());
    }

    #[test]
    fn read_utf16_unterminated() {
        let mut reader = Cursor::new(hex!("6100 6200"));
        let result = read_utf16(&mut reader);
        assert!(matches!(
            result,
            Err(MsbError::Format { offset: 0, .. })
        ));
    }

    #[test]
    fn write_utf16_string() {
        let mut writer = Cursor::new(Vec::new());
        write_utf16(&mut writer, "m000").unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("6D00 3000 3000 3000 0000"));
    }

    #[test]
    fn write_utf16_empty() {
        let mut writer = Cursor::new(Vec::new());
        write_utf16(&mut writer, "").unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("0000"));
    }

    #[test]
    fn write_utf16_rejects_embedded_null() {
        let mut writer = Cursor::new(Vec::new());
        let result = write_utf16(&mut writer, "a\0b");
        assert!(matches!(result, Err(MsbError::Invariant(_))));
    }

    #[test]
    fn utf16_round_trip_non_ascii() {
        let mut writer = Cursor::new(Vec::new());
        write_utf16(&mut writer, "祝福").unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        assert_eq!("祝福", read_utf16(&mut reader).unwrap());
    }
}
