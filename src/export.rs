use std::io::{Cursor, Seek, SeekFrom, Write};

use crate::error::MsbError;
use crate::record::Record;

pub(crate) fn round_up(value: u64, n: u64) -> u64 {
    // Find the next largest multiple of n.
    ((value + n - 1) / n) * n
}

/// Pads the writer with zeroes to the next multiple of `n`.
pub(crate) fn align_writer<W: Write + Seek>(writer: &mut W, n: u64) -> std::io::Result<()> {
    let pos = writer.stream_position()?;
    let aligned = round_up(pos, n);
    for _ in pos..aligned {
        writer.write_all(&[0u8])?;
    }
    Ok(())
}

/// Writes `count` zero bytes.
pub(crate) fn write_zeroes<W: Write>(writer: &mut W, count: usize) -> std::io::Result<()> {
    writer.write_all(&vec![0u8; count])
}

#[derive(Debug)]
struct Slot {
    name: String,
    position: u64,
    size: u32,
    filled: bool,
}

/// Named placeholders for header fields that are only knowable after later
/// data is written.
///
/// `reserve` stamps out zeroed space at the current position; `fill` seeks
/// back and overwrites it once the value is known, restoring the writer's
/// position afterwards. Every slot must be filled before [Reservations::finish];
/// dropping the set with unfilled slots is a programmer error and panics.
pub(crate) struct Reservations {
    slots: Vec<Slot>,
    finished: bool,
}

impl Reservations {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            finished: false,
        }
    }

    /// Records the current position under `name` and advances the writer by
    /// `size` zero bytes.
    pub fn reserve<W: Write + Seek>(
        &mut self,
        writer: &mut W,
        name: &str,
        size: u32,
    ) -> Result<(), MsbError> {
        if self.slots.iter().any(|s| s.name == name) {
            return Err(MsbError::invariant(format!(
                "offset slot {name:?} is already reserved"
            )));
        }
        let position = writer.stream_position()?;
        write_zeroes(writer, size as usize)?;
        self.slots.push(Slot {
            name: name.to_owned(),
            position,
            size,
            filled: false,
        });
        Ok(())
    }

    /// Seeks back to the slot, writes `bytes`, and restores the previous
    /// position. `bytes` must match the reserved size exactly.
    pub fn fill<W: Write + Seek>(
        &mut self,
        writer: &mut W,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), MsbError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| MsbError::invariant(format!("offset slot {name:?} was never reserved")))?;
        if slot.filled {
            return Err(MsbError::invariant(format!(
                "offset slot {name:?} is already filled"
            )));
        }
        if bytes.len() != slot.size as usize {
            return Err(MsbError::invariant(format!(
                "offset slot {name:?} holds {} bytes, got {}",
                slot.size,
                bytes.len()
            )));
        }
        let saved = writer.stream_position()?;
        writer.seek(SeekFrom::Start(slot.position))?;
        writer.write_all(bytes)?;
        writer.seek(SeekFrom::Start(saved))?;
        slot.filled = true;
        Ok(())
    }

    /// Reserves space for a packed record.
    pub fn reserve_record<T: Record, W: Write + Seek>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), MsbError> {
        self.reserve(writer, T::NAME, T::SIZE)
    }

    /// Validates `record` and writes it into its reserved slot.
    pub fn fill_record<T: Record, W: Write + Seek>(
        &mut self,
        writer: &mut W,
        record: &T,
    ) -> Result<(), MsbError> {
        let position = self
            .slots
            .iter()
            .find(|s| s.name == T::NAME)
            .map(|s| s.position)
            .ok_or_else(|| {
                MsbError::invariant(format!("offset slot {:?} was never reserved", T::NAME))
            })?;
        record.validate(position)?;

        let mut bytes = Cursor::new(Vec::with_capacity(T::SIZE as usize));
        record.put(&mut bytes)?;
        self.fill(writer, T::NAME, bytes.get_ref())
    }

    /// Consumes the set, failing if any slot was never filled.
    pub fn finish(mut self) -> Result<(), MsbError> {
        self.finished = true;
        if let Some(slot) = self.slots.iter().find(|s| !s.filled) {
            return Err(MsbError::invariant(format!(
                "offset slot {:?} was never filled",
                slot.name
            )));
        }
        Ok(())
    }
}

impl Drop for Reservations {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() && self.slots.iter().any(|s| !s.filled) {
            panic!("Reservations dropped with unfilled offset slots");
        }
    }
}

/// Stages the whole write in memory so a failed write never leaves partial
/// output in `writer`.
pub(crate) fn write_buffered<W: Write, F: FnOnce(&mut Cursor<Vec<u8>>) -> Result<(), MsbError>>(
    writer: &mut W,
    write_data: F,
) -> Result<(), MsbError> {
    let mut cursor = Cursor::new(Vec::new());
    write_data(&mut cursor)?;

    writer.write_all(cursor.get_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;

    #[test]
    fn round_up_powers_of_two() {
        assert_eq!(0, round_up(0, 8));
        assert_eq!(8, round_up(1, 8));
        assert_eq!(8, round_up(8, 8));
        assert_eq!(16, round_up(9, 8));
        assert_eq!(12, round_up(9, 4));
    }

    #[test]
    fn align_pads_with_zeroes() {
        let mut writer = Cursor::new(Vec::new());
        writer.write_all(&[0xFF; 3]).unwrap();
        align_writer(&mut writer, 8).unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("FFFFFF00 00000000"));
    }

    #[test]
    fn reserve_then_fill() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();

        writer.write_all(&[0xAA]).unwrap();
        reservations.reserve(&mut writer, "offset", 4).unwrap();
        writer.write_all(&[0xBB]).unwrap();

        reservations
            .fill(&mut writer, "offset", &hex!("01020304"))
            .unwrap();
        reservations.finish().unwrap();

        // The writer position is restored after the fill.
        assert_eq!(6, writer.position());
        assert_eq!(writer.get_ref().as_slice(), hex!("AA 01020304 BB"));
    }

    #[test]
    fn reserve_duplicate_name_fails() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();
        reservations.reserve(&mut writer, "offset", 4).unwrap();

        let result = reservations.reserve(&mut writer, "offset", 4);
        assert!(matches!(result, Err(MsbError::Invariant(_))));

        reservations.fill(&mut writer, "offset", &[0; 4]).unwrap();
        reservations.finish().unwrap();
    }

    #[test]
    fn fill_unknown_name_fails() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();
        let result = reservations.fill(&mut writer, "missing", &[0; 4]);
        assert!(matches!(result, Err(MsbError::Invariant(_))));
        reservations.finish().unwrap();
    }

    #[test]
    fn fill_wrong_size_fails() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();
        reservations.reserve(&mut writer, "offset", 4).unwrap();

        let result = reservations.fill(&mut writer, "offset", &[0; 2]);
        assert!(matches!(result, Err(MsbError::Invariant(_))));

        reservations.fill(&mut writer, "offset", &[0; 4]).unwrap();
        reservations.finish().unwrap();
    }

    #[test]
    fn finish_with_unfilled_slot_fails() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();
        reservations.reserve(&mut writer, "offset", 4).unwrap();

        let result = reservations.finish();
        assert!(matches!(result, Err(MsbError::Invariant(_))));
    }

    #[test]
    #[should_panic(expected = "unfilled offset slots")]
    fn drop_with_unfilled_slot_panics() {
        let mut writer = Cursor::new(Vec::new());
        let mut reservations = Reservations::new();
        reservations.reserve(&mut writer, "offset", 4).unwrap();
        drop(reservations);
    }

    #[test]
    fn buffered_write_discards_failed_output() {
        let mut output = Vec::new();
        let result = write_buffered(&mut output, |cursor| {
            cursor.write_all(&[1, 2, 3])?;
            Err(MsbError::invariant("boom"))
        });
        assert!(result.is_err());
        assert!(output.is_empty());
    }
}
