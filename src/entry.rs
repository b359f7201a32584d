use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use binread::{
    io::{Read, Seek},
    BinRead, BinResult, ReadOptions,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MsbError;

/// Identity token for one entry, unique for the lifetime of the process.
///
/// References track entries by identity rather than by list position, so
/// inserting or removing entries between read and write cannot silently
/// retarget them.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryId(u32);

static NEXT_ENTRY_ID: AtomicU32 = AtomicU32::new(1);

impl EntryId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One concrete entry supertype stored in an entry param.
pub trait MsbEntry: Sized {
    /// The fixed param name that terminates this supertype's offset table.
    const PARAM_NAME: &'static str;

    fn name(&self) -> &str;
    fn id(&self) -> EntryId;

    /// The subtype tag stored in this entry's header. Entries are grouped
    /// by ascending tag in canonical write order.
    fn subtype_tag(&self) -> u32;

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError>;
    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError>;
}

/// Identity snapshot of one param, taken before a resolve or index pass.
///
/// Passing snapshots instead of entry slices keeps references between
/// entries of the same supertype borrow-safe.
pub(crate) struct EntryKey {
    pub id: EntryId,
    pub name: String,
    pub tag: u32,
}

pub(crate) fn entry_keys<T: MsbEntry>(entries: &[T]) -> Vec<EntryKey> {
    entries
        .iter()
        .map(|e| EntryKey {
            id: e.id(),
            name: e.name().to_owned(),
            tag: e.subtype_tag(),
        })
        .collect()
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
struct RefTarget {
    id: EntryId,
    // The target's name when the reference was bound, kept for error messages.
    name: String,
}

/// A non-owning reference to an entry of supertype `T`.
///
/// Stored on disk as a signed 32 bit supertype index; `-1` means no
/// reference. In memory the reference tracks the target's identity, and
/// converting back to an index scans the target param for the first match.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct MsbRef<T: MsbEntry> {
    target: Option<RefTarget>,
    index: i32,
    #[cfg_attr(feature = "serde", serde(skip))]
    _marker: PhantomData<fn() -> T>,
}

// Not derived so that comparing references does not require comparing
// whole entries.
impl<T: MsbEntry> PartialEq for MsbRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.index == other.index
    }
}

impl<T: MsbEntry> MsbRef<T> {
    pub fn null() -> Self {
        Self {
            target: None,
            index: -1,
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_index(index: i32) -> Self {
        Self {
            target: None,
            index,
            _marker: PhantomData,
        }
    }

    /// Points this reference at `entry`.
    pub fn set(&mut self, entry: &T) {
        self.target = Some(RefTarget {
            id: entry.id(),
            name: entry.name().to_owned(),
        });
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.index = -1;
    }

    pub fn is_set(&self) -> bool {
        self.target.is_some()
    }

    /// Whether this reference currently points at `entry`.
    pub fn points_to(&self, entry: &T) -> bool {
        self.target.as_ref().map(|t| t.id == entry.id()).unwrap_or(false)
    }

    /// The name the target had when the reference was bound or resolved.
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }

    /// Promotes the on-disk index to an entry identity.
    pub(crate) fn resolve(&mut self, keys: &[EntryKey]) -> Result<(), MsbError> {
        if self.index < 0 {
            self.target = None;
            return Ok(());
        }
        let key = keys
            .get(self.index as usize)
            .ok_or(MsbError::BadReferenceIndex {
                param: T::PARAM_NAME,
                index: self.index,
                count: keys.len(),
            })?;
        self.target = Some(RefTarget {
            id: key.id,
            name: key.name.clone(),
        });
        Ok(())
    }

    /// Converts the entry identity back to a supertype index, scanning
    /// `keys` for the first match.
    pub(crate) fn sync(&mut self, source: &str, keys: &[EntryKey]) -> Result<(), MsbError> {
        self.index = match &self.target {
            None => -1,
            Some(target) => keys
                .iter()
                .position(|k| k.id == target.id)
                .ok_or_else(|| MsbError::DanglingReference {
                    from: source.to_owned(),
                    target: target.name.clone(),
                })? as i32,
        };
        Ok(())
    }

    /// The on-disk index as of the last read or sync pass.
    pub(crate) fn raw_index(&self) -> i32 {
        self.index
    }

    pub(crate) fn put<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self.index)
    }
}

impl<T: MsbEntry> Default for MsbRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: MsbEntry> BinRead for MsbRef<T> {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let index = i32::read_options(reader, options, ())?;
        Ok(Self::from_index(index))
    }
}

/// A non-owning reference stored on disk as a
/// `(supertype_index, subtype_index)` pair, both `-1` when unset.
///
/// Resolution only consults the supertype index; the subtype index is
/// recomputed on write as the target's ordinal among same-subtype siblings.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct MsbRefPair<T: MsbEntry> {
    target: Option<RefTarget>,
    index: i32,
    subtype_index: i32,
    #[cfg_attr(feature = "serde", serde(skip))]
    _marker: PhantomData<fn() -> T>,
}

impl<T: MsbEntry> PartialEq for MsbRefPair<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.index == other.index
            && self.subtype_index == other.subtype_index
    }
}

impl<T: MsbEntry> MsbRefPair<T> {
    pub fn null() -> Self {
        Self {
            target: None,
            index: -1,
            subtype_index: -1,
            _marker: PhantomData,
        }
    }

    pub fn set(&mut self, entry: &T) {
        self.target = Some(RefTarget {
            id: entry.id(),
            name: entry.name().to_owned(),
        });
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.index = -1;
        self.subtype_index = -1;
    }

    pub fn is_set(&self) -> bool {
        self.target.is_some()
    }

    pub fn points_to(&self, entry: &T) -> bool {
        self.target.as_ref().map(|t| t.id == entry.id()).unwrap_or(false)
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }

    pub(crate) fn resolve(&mut self, keys: &[EntryKey]) -> Result<(), MsbError> {
        if self.index < 0 {
            self.target = None;
            return Ok(());
        }
        let key = keys
            .get(self.index as usize)
            .ok_or(MsbError::BadReferenceIndex {
                param: T::PARAM_NAME,
                index: self.index,
                count: keys.len(),
            })?;
        self.target = Some(RefTarget {
            id: key.id,
            name: key.name.clone(),
        });
        Ok(())
    }

    pub(crate) fn sync(&mut self, source: &str, keys: &[EntryKey]) -> Result<(), MsbError> {
        match &self.target {
            None => {
                self.index = -1;
                self.subtype_index = -1;
            }
            Some(target) => {
                let position = keys
                    .iter()
                    .position(|k| k.id == target.id)
                    .ok_or_else(|| MsbError::DanglingReference {
                        from: source.to_owned(),
                        target: target.name.clone(),
                    })?;
                self.index = position as i32;
                self.subtype_index = keys[..position]
                    .iter()
                    .filter(|k| k.tag == keys[position].tag)
                    .count() as i32;
            }
        }
        Ok(())
    }

    pub(crate) fn put<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self.index)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        Ok(())
    }
}

impl<T: MsbEntry> Default for MsbRefPair<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: MsbEntry> BinRead for MsbRefPair<T> {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let index = i32::read_options(reader, options, ())?;
        let subtype_index = i32::read_options(reader, options, ())?;
        Ok(Self {
            target: None,
            index,
            subtype_index,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binread::BinReaderExt;
    use hexlit::hex;
    use std::io::Cursor;

    struct TestEntry {
        id: EntryId,
        name: String,
        tag: u32,
    }

    impl TestEntry {
        fn new(name: &str, tag: u32) -> Self {
            Self {
                id: EntryId::fresh(),
                name: name.to_owned(),
                tag,
            }
        }
    }

    impl MsbEntry for TestEntry {
        const PARAM_NAME: &'static str = "TEST_PARAM_ST";

        fn name(&self) -> &str {
            &self.name
        }

        fn id(&self) -> EntryId {
            self.id
        }

        fn subtype_tag(&self) -> u32 {
            self.tag
        }

        fn read<R: Read + Seek>(_reader: &mut R) -> Result<Self, MsbError> {
            todo!()
        }

        fn write<W: Write + Seek>(
            &self,
            _writer: &mut W,
            _subtype_index: i32,
        ) -> Result<(), MsbError> {
            todo!()
        }
    }

    #[test]
    fn read_ref() {
        let mut reader = Cursor::new(hex!("02000000"));
        let value = reader.read_le::<MsbRef<TestEntry>>().unwrap();
        assert_eq!(2, value.index);
    }

    #[test]
    fn null_ref_round_trip() {
        let entries = [TestEntry::new("a", 0)];
        let keys = entry_keys(&entries);

        let mut reference = MsbRef::<TestEntry>::from_index(-1);
        reference.resolve(&keys).unwrap();
        assert!(!reference.is_set());

        reference.sync("source", &keys).unwrap();
        let mut writer = Cursor::new(Vec::new());
        reference.put(&mut writer).unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("FFFFFFFF"));
    }

    #[test]
    fn resolve_then_sync_preserves_target() {
        let entries = [TestEntry::new("a", 0), TestEntry::new("b", 0)];
        let keys = entry_keys(&entries);

        let mut reference = MsbRef::<TestEntry>::from_index(1);
        reference.resolve(&keys).unwrap();
        assert!(reference.points_to(&entries[1]));

        reference.sync("source", &keys).unwrap();
        assert_eq!(1, reference.index);
    }

    #[test]
    fn resolve_out_of_range_index() {
        let entries = [TestEntry::new("a", 0)];
        let keys = entry_keys(&entries);

        let mut reference = MsbRef::<TestEntry>::from_index(5);
        let result = reference.resolve(&keys);
        assert!(matches!(
            result,
            Err(MsbError::BadReferenceIndex {
                param: "TEST_PARAM_ST",
                index: 5,
                count: 1,
            })
        ));
    }

    #[test]
    fn sync_dangling_reference_names_both_ends() {
        let removed = TestEntry::new("removed", 0);
        let mut reference = MsbRef::<TestEntry>::null();
        reference.set(&removed);

        let keys = entry_keys::<TestEntry>(&[]);
        let result = reference.sync("holder", &keys);
        match result {
            Err(MsbError::DanglingReference { from: source, target }) => {
                assert_eq!("holder", source);
                assert_eq!("removed", target);
            }
            other => panic!("expected a dangling reference error, got {other:?}"),
        }
    }

    #[test]
    fn pair_sync_computes_subtype_ordinal() {
        // Tags: 3, 7, 7, 7 -> the last entry is the third subtype-7 sibling.
        let entries = [
            TestEntry::new("a", 3),
            TestEntry::new("b", 7),
            TestEntry::new("c", 7),
            TestEntry::new("d", 7),
        ];
        let keys = entry_keys(&entries);

        let mut reference = MsbRefPair::<TestEntry>::null();
        reference.set(&entries[3]);
        reference.sync("source", &keys).unwrap();

        let mut writer = Cursor::new(Vec::new());
        reference.put(&mut writer).unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("03000000 02000000"));
    }

    #[test]
    fn pair_read_then_resolve() {
        let entries = [TestEntry::new("a", 3), TestEntry::new("b", 7)];
        let keys = entry_keys(&entries);

        let mut reader = Cursor::new(hex!("01000000 00000000"));
        let mut value = reader.read_le::<MsbRefPair<TestEntry>>().unwrap();
        value.resolve(&keys).unwrap();
        assert!(value.points_to(&entries[1]));
    }
}
