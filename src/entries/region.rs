//! Region entries mark functional volumes and points: sounds, VFX,
//! spawn points, muffling geometry, and the rest of this dialect's
//! region table.

use binread::{
    io::{Read, Seek, SeekFrom},
    BinRead, BinReaderExt, BinResult, ReadOptions,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entries::part::Part;
use crate::entries::shape::{Shape, ShapeType};
use crate::entry::{EntryId, EntryKey, MsbEntry, MsbRef};
use crate::error::MsbError;
use crate::export::{align_writer, write_zeroes, Reservations};
use crate::record::{expect_non_negative, expect_positive, expect_zero, read_record, Record};
use crate::strings::{read_utf16, write_utf16};
use crate::vectors::Vector3;

/// Region subtype tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RegionType {
    InvasionPoint = 1,
    EnvironmentMapPoint = 2,
    Sound = 4,
    VFX = 5,
    WindVFX = 6,
    SpawnPoint = 8,
    Message = 9,
    EnvironmentMapEffectBox = 17,
    WindArea = 18,
    Connection = 21,
    PatrolRoute22 = 22,
    BuddySummonPoint = 26,
    MufflingBox = 28,
    MufflingPortal = 29,
    OtherSound = 30,
    MufflingPlane = 31,
    // NOTE: be wary of the Event subtype with the same name.
    PatrolRoute = 32,
    MapPoint = 33,
    WeatherOverride = 35,
    AutoDrawGroupPoint = 36,
    GroupDefeatReward = 37,
    MapPointDiscoveryOverride = 38,
    MapPointParticipationOverride = 39,
    Hitset = 40,
    FastTravelRestriction = 41,
    WeatherCreateAssetPoint = 42,
    PlayArea = 43,
    EnvironmentMapOutput = 44,
    MountJump = 46,
    Dummy = 48,
    FallPreventionRemoval = 49,
    NavmeshCutting = 50,
    MapNameOverride = 51,
    MountJumpFall = 52,
    HorseRideOverride = 53,
    Other = 0xFFFFFFFF,
}

impl RegionType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::InvasionPoint),
            2 => Some(Self::EnvironmentMapPoint),
            4 => Some(Self::Sound),
            5 => Some(Self::VFX),
            6 => Some(Self::WindVFX),
            8 => Some(Self::SpawnPoint),
            9 => Some(Self::Message),
            17 => Some(Self::EnvironmentMapEffectBox),
            18 => Some(Self::WindArea),
            21 => Some(Self::Connection),
            22 => Some(Self::PatrolRoute22),
            26 => Some(Self::BuddySummonPoint),
            28 => Some(Self::MufflingBox),
            29 => Some(Self::MufflingPortal),
            30 => Some(Self::OtherSound),
            31 => Some(Self::MufflingPlane),
            32 => Some(Self::PatrolRoute),
            33 => Some(Self::MapPoint),
            35 => Some(Self::WeatherOverride),
            36 => Some(Self::AutoDrawGroupPoint),
            37 => Some(Self::GroupDefeatReward),
            38 => Some(Self::MapPointDiscoveryOverride),
            39 => Some(Self::MapPointParticipationOverride),
            40 => Some(Self::Hitset),
            41 => Some(Self::FastTravelRestriction),
            42 => Some(Self::WeatherCreateAssetPoint),
            43 => Some(Self::PlayArea),
            44 => Some(Self::EnvironmentMapOutput),
            46 => Some(Self::MountJump),
            48 => Some(Self::Dummy),
            49 => Some(Self::FallPreventionRemoval),
            50 => Some(Self::NavmeshCutting),
            51 => Some(Self::MapNameOverride),
            52 => Some(Self::MountJumpFall),
            53 => Some(Self::HorseRideOverride),
            0xFFFFFFFF => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(BinRead, Debug)]
struct RegionHeader {
    name_offset: i64,
    region_subtype: u32,
    subtype_index: i32,
    shape_type: u32,
    translate: Vector3,
    rotate: Vector3,
    pad2c: i32,
    shorts_a_offset: i64,
    shorts_b_offset: i64,
    h_unk40: i32,
    event_layer: i32,
    part_data_offset: i64,
    entity_data_offset: i64,
    shape_data_offset: i64,
    subtype_data_offset: i64,
}

impl Record for RegionHeader {
    const NAME: &'static str = "RegionHeader";
    const SIZE: u32 = 0x68;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_positive(Self::NAME, "name_offset", offset, self.name_offset)?;
        expect_zero(Self::NAME, "pad2c", offset, self.pad2c as i64)?;
        expect_positive(Self::NAME, "shorts_a_offset", offset, self.shorts_a_offset)?;
        expect_positive(Self::NAME, "shorts_b_offset", offset, self.shorts_b_offset)?;
        expect_positive(
            Self::NAME,
            "part_data_offset",
            offset,
            self.part_data_offset,
        )?;
        expect_positive(
            Self::NAME,
            "entity_data_offset",
            offset,
            self.entity_data_offset,
        )?;
        expect_non_negative(
            Self::NAME,
            "shape_data_offset",
            offset,
            self.shape_data_offset,
        )?;
        expect_non_negative(
            Self::NAME,
            "subtype_data_offset",
            offset,
            self.subtype_data_offset,
        )?;
        Ok(())
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<LittleEndian>(self.name_offset)?;
        writer.write_u32::<LittleEndian>(self.region_subtype)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        writer.write_u32::<LittleEndian>(self.shape_type)?;
        self.translate.put(writer)?;
        self.rotate.put(writer)?;
        writer.write_i32::<LittleEndian>(self.pad2c)?;
        writer.write_i64::<LittleEndian>(self.shorts_a_offset)?;
        writer.write_i64::<LittleEndian>(self.shorts_b_offset)?;
        writer.write_i32::<LittleEndian>(self.h_unk40)?;
        writer.write_i32::<LittleEndian>(self.event_layer)?;
        writer.write_i64::<LittleEndian>(self.part_data_offset)?;
        writer.write_i64::<LittleEndian>(self.entity_data_offset)?;
        writer.write_i64::<LittleEndian>(self.shape_data_offset)?;
        writer.write_i64::<LittleEndian>(self.subtype_data_offset)?;
        Ok(())
    }
}

/// Sound playback bounds and the chained child regions.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SoundData {
    pub sound_type: i32,
    pub sound_id: i32,
    pub child_regions: [MsbRef<Region>; 16],
    pub unk49: u8,
}

impl Default for SoundData {
    fn default() -> Self {
        Self {
            sound_type: 0,
            sound_id: 0,
            child_regions: std::array::from_fn(|_| MsbRef::null()),
            unk49: 0,
        }
    }
}

impl BinRead for SoundData {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let sound_type = i32::read_options(reader, options, ())?;
        let sound_id = i32::read_options(reader, options, ())?;
        let mut child_regions: [MsbRef<Region>; 16] = std::array::from_fn(|_| MsbRef::null());
        for region in child_regions.iter_mut() {
            *region = MsbRef::read_options(reader, options, ())?;
        }
        reader.seek(SeekFrom::Current(1))?;
        let unk49 = u8::read_options(reader, options, ())?;
        reader.seek(SeekFrom::Current(6))?;
        Ok(Self {
            sound_type,
            sound_id,
            child_regions,
            unk49,
        })
    }
}

impl SoundData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self.sound_type)?;
        writer.write_i32::<LittleEndian>(self.sound_id)?;
        for region in &self.child_regions {
            region.put(writer)?;
        }
        write_zeroes(writer, 1)?;
        writer.write_u8(self.unk49)?;
        write_zeroes(writer, 6)?;
        Ok(())
    }
}

/// The parts whose combined defeat grants this region's reward.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDefeatRewardData {
    pub unk00: i32,
    pub unk04: i32,
    pub unk08: i32,
    pub group_parts: [MsbRef<Part>; 8],
    pub unk34: i32,
    pub unk38: i32,
    pub unk54: i32,
}

impl Default for GroupDefeatRewardData {
    fn default() -> Self {
        Self {
            unk00: 0,
            unk04: 0,
            unk08: 0,
            group_parts: std::array::from_fn(|_| MsbRef::null()),
            unk34: 0,
            unk38: 0,
            unk54: 0,
        }
    }
}

impl BinRead for GroupDefeatRewardData {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let unk00 = i32::read_options(reader, options, ())?;
        let unk04 = i32::read_options(reader, options, ())?;
        let unk08 = i32::read_options(reader, options, ())?;
        let mut group_parts: [MsbRef<Part>; 8] = std::array::from_fn(|_| MsbRef::null());
        for part in group_parts.iter_mut() {
            *part = MsbRef::read_options(reader, options, ())?;
        }
        reader.seek(SeekFrom::Current(8))?;
        let unk34 = i32::read_options(reader, options, ())?;
        let unk38 = i32::read_options(reader, options, ())?;
        reader.seek(SeekFrom::Current(24))?;
        let unk54 = i32::read_options(reader, options, ())?;
        Ok(Self {
            unk00,
            unk04,
            unk08,
            group_parts,
            unk34,
            unk38,
            unk54,
        })
    }
}

impl GroupDefeatRewardData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self.unk00)?;
        writer.write_i32::<LittleEndian>(self.unk04)?;
        writer.write_i32::<LittleEndian>(self.unk08)?;
        for part in &self.group_parts {
            part.put(writer)?;
        }
        write_zeroes(writer, 8)?;
        writer.write_i32::<LittleEndian>(self.unk34)?;
        writer.write_i32::<LittleEndian>(self.unk38)?;
        write_zeroes(writer, 24)?;
        writer.write_i32::<LittleEndian>(self.unk54)?;
        Ok(())
    }
}

/// The map a connection region links to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionData {
    /// Target map reference, e.g. `[10, 0, 0, 0]` for m10_00_00_00.
    pub target_map_id: [i8; 4],
}

impl BinRead for ConnectionData {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let mut target_map_id = [0i8; 4];
        for byte in target_map_id.iter_mut() {
            *byte = i8::read_options(reader, options, ())?;
        }
        reader.seek(SeekFrom::Current(4))?;
        Ok(Self { target_map_id })
    }
}

impl ConnectionData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        for byte in &self.target_map_id {
            writer.write_i8(*byte)?;
        }
        write_zeroes(writer, 4)?;
        Ok(())
    }
}

/// Whether horseback riding is allowed inside a horse ride override region.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum HorseRideOverrideType {
    Default = 0,
    Prevent = 1,
    Allow = 2,
}

impl BinRead for HorseRideOverrideType {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let raw = i32::read_options(reader, options, ())?;
        match raw {
            0 => Ok(Self::Default),
            1 => Ok(Self::Prevent),
            2 => Ok(Self::Allow),
            _ => Err(binread::Error::AssertFail {
                pos,
                message: format!("unknown horse ride override type {raw}"),
            }),
        }
    }
}

/// Per-subtype region payload. The variant selects the subtype tag.
///
/// Unknown fields keep hex names encoding their block offsets until they
/// are identified.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(import(tag: u32))]
pub enum RegionData {
    #[br(pre_assert(tag == RegionType::InvasionPoint as u32))]
    InvasionPoint { priority: i32 },

    #[br(pre_assert(tag == RegionType::EnvironmentMapPoint as u32))]
    EnvironmentMapPoint {
        unk00: f32,
        #[br(pad_after = 4)]
        unk04: i32,
        unk0c: u8,
        unk0d: u8,
        unk0e: u8,
        unk0f: u8,
        unk10: f32,
        unk14: f32,
        #[br(pad_after = 4)]
        map_id: i32,
        unk20: i32,
        unk24: i32,
        unk28: i32,
        unk2c: u8,
        #[br(pad_after = 2)]
        unk2d: u8,
    },

    #[br(pre_assert(tag == RegionType::Sound as u32))]
    Sound(SoundData),

    #[br(pre_assert(tag == RegionType::VFX as u32))]
    VFX { effect_id: i32, unk04: i32 },

    #[br(pre_assert(tag == RegionType::WindVFX as u32))]
    WindVFX {
        effect_id: i32,
        wind_region: MsbRef<Region>,
        unk08: f32,
    },

    #[br(pre_assert(tag == RegionType::SpawnPoint as u32))]
    SpawnPoint,

    #[br(pre_assert(tag == RegionType::Message as u32))]
    Message {
        message_id: i16,
        unk02: i16,
        /// Stored as a 32 bit integer; any nonzero value reads as hidden.
        #[br(map = |raw: i32| raw != 0)]
        hidden: bool,
        unk08: i32,
        unk0c: i32,
        enable_event_flag_id: u32,
        character_model_name: i32,
        character_id: i32,
        animation_id: i32,
        player_id: i32,
    },

    #[br(pre_assert(tag == RegionType::EnvironmentMapEffectBox as u32))]
    EnvironmentMapEffectBox {
        enable_dist: f32,
        transition_dist: f32,
        unk08: u8,
        unk09: u8,
        #[br(pad_after = 24)]
        unk0a: i16,
        unk24: f32,
        unk28: f32,
        unk2c: i16,
        unk2e: u8,
        unk2f: u8,
        #[br(pad_after = 1)]
        unk30: i16,
        unk33: u8,
        unk34: i16,
        unk36: i16,
    },

    #[br(pre_assert(tag == RegionType::WindArea as u32))]
    WindArea,

    #[br(pre_assert(tag == RegionType::Connection as u32))]
    Connection(ConnectionData),

    #[br(pre_assert(tag == RegionType::PatrolRoute22 as u32))]
    PatrolRoute22,

    #[br(pre_assert(tag == RegionType::BuddySummonPoint as u32))]
    BuddySummonPoint,

    #[br(pre_assert(tag == RegionType::MufflingBox as u32))]
    MufflingBox {
        #[br(pad_after = 32)]
        unk00: i32,
        #[br(pad_after = 12)]
        unk24: f32,
        #[br(pad_after = 4)]
        unk34: f32,
        unk3c: f32,
        unk40: f32,
        unk44: f32,
    },

    #[br(pre_assert(tag == RegionType::MufflingPortal as u32))]
    MufflingPortal {
        #[br(pad_after = 12)]
        unk00: i32,
    },

    #[br(pre_assert(tag == RegionType::OtherSound as u32))]
    OtherSound {
        unk00: u8,
        unk01: u8,
        unk02: u8,
        unk03: u8,
        unk04: i32,
        unk08: i16,
        unk0a: i16,
        #[br(pad_after = 3)]
        unk0c: u8,
    },

    #[br(pre_assert(tag == RegionType::MufflingPlane as u32))]
    MufflingPlane,

    #[br(pre_assert(tag == RegionType::PatrolRoute as u32))]
    PatrolRoute { unk00: i32 },

    #[br(pre_assert(tag == RegionType::MapPoint as u32))]
    MapPoint {
        unk00: i32,
        unk04: i32,
        unk08: f32,
        #[br(pad_after = 4)]
        unk0c: f32,
        unk14: f32,
        unk18: f32,
    },

    #[br(pre_assert(tag == RegionType::WeatherOverride as u32))]
    WeatherOverride { weather_lot_id: i32 },

    #[br(pre_assert(tag == RegionType::AutoDrawGroupPoint as u32))]
    AutoDrawGroupPoint { unk00: i32 },

    #[br(pre_assert(tag == RegionType::GroupDefeatReward as u32))]
    GroupDefeatReward(GroupDefeatRewardData),

    #[br(pre_assert(tag == RegionType::MapPointDiscoveryOverride as u32))]
    MapPointDiscoveryOverride,

    #[br(pre_assert(tag == RegionType::MapPointParticipationOverride as u32))]
    MapPointParticipationOverride,

    #[br(pre_assert(tag == RegionType::Hitset as u32))]
    Hitset { unk00: i32 },

    #[br(pre_assert(tag == RegionType::FastTravelRestriction as u32))]
    FastTravelRestriction {
        #[br(pad_after = 4)]
        event_flag_id: u32,
    },

    #[br(pre_assert(tag == RegionType::WeatherCreateAssetPoint as u32))]
    WeatherCreateAssetPoint,

    #[br(pre_assert(tag == RegionType::PlayArea as u32))]
    PlayArea { unk00: i32, unk04: i32 },

    #[br(pre_assert(tag == RegionType::EnvironmentMapOutput as u32))]
    EnvironmentMapOutput,

    #[br(pre_assert(tag == RegionType::MountJump as u32))]
    MountJump { jump_height: f32, unk04: i32 },

    #[br(pre_assert(tag == RegionType::Dummy as u32))]
    Dummy { unk00: i32 },

    #[br(pre_assert(tag == RegionType::FallPreventionRemoval as u32))]
    FallPreventionRemoval,

    #[br(pre_assert(tag == RegionType::NavmeshCutting as u32))]
    NavmeshCutting,

    #[br(pre_assert(tag == RegionType::MapNameOverride as u32))]
    MapNameOverride { map_name_id: i32 },

    #[br(pre_assert(tag == RegionType::MountJumpFall as u32))]
    MountJumpFall,

    #[br(pre_assert(tag == RegionType::HorseRideOverride as u32))]
    HorseRideOverride {
        override_type: HorseRideOverrideType,
    },

    #[br(pre_assert(tag == RegionType::Other as u32))]
    Other,
}

impl RegionData {
    pub fn region_type(&self) -> RegionType {
        match self {
            RegionData::InvasionPoint { .. } => RegionType::InvasionPoint,
            RegionData::EnvironmentMapPoint { .. } => RegionType::EnvironmentMapPoint,
            RegionData::Sound(_) => RegionType::Sound,
            RegionData::VFX { .. } => RegionType::VFX,
            RegionData::WindVFX { .. } => RegionType::WindVFX,
            RegionData::SpawnPoint => RegionType::SpawnPoint,
            RegionData::Message { .. } => RegionType::Message,
            RegionData::EnvironmentMapEffectBox { .. } => RegionType::EnvironmentMapEffectBox,
            RegionData::WindArea => RegionType::WindArea,
            RegionData::Connection(_) => RegionType::Connection,
            RegionData::PatrolRoute22 => RegionType::PatrolRoute22,
            RegionData::BuddySummonPoint => RegionType::BuddySummonPoint,
            RegionData::MufflingBox { .. } => RegionType::MufflingBox,
            RegionData::MufflingPortal { .. } => RegionType::MufflingPortal,
            RegionData::OtherSound { .. } => RegionType::OtherSound,
            RegionData::MufflingPlane => RegionType::MufflingPlane,
            RegionData::PatrolRoute { .. } => RegionType::PatrolRoute,
            RegionData::MapPoint { .. } => RegionType::MapPoint,
            RegionData::WeatherOverride { .. } => RegionType::WeatherOverride,
            RegionData::AutoDrawGroupPoint { .. } => RegionType::AutoDrawGroupPoint,
            RegionData::GroupDefeatReward(_) => RegionType::GroupDefeatReward,
            RegionData::MapPointDiscoveryOverride => RegionType::MapPointDiscoveryOverride,
            RegionData::MapPointParticipationOverride => {
                RegionType::MapPointParticipationOverride
            }
            RegionData::Hitset { .. } => RegionType::Hitset,
            RegionData::FastTravelRestriction { .. } => RegionType::FastTravelRestriction,
            RegionData::WeatherCreateAssetPoint => RegionType::WeatherCreateAssetPoint,
            RegionData::PlayArea { .. } => RegionType::PlayArea,
            RegionData::EnvironmentMapOutput => RegionType::EnvironmentMapOutput,
            RegionData::MountJump { .. } => RegionType::MountJump,
            RegionData::Dummy { .. } => RegionType::Dummy,
            RegionData::FallPreventionRemoval => RegionType::FallPreventionRemoval,
            RegionData::NavmeshCutting => RegionType::NavmeshCutting,
            RegionData::MapNameOverride { .. } => RegionType::MapNameOverride,
            RegionData::MountJumpFall => RegionType::MountJumpFall,
            RegionData::HorseRideOverride { .. } => RegionType::HorseRideOverride,
            RegionData::Other => RegionType::Other,
        }
    }

    /// Variants with no subtype data block at all; their headers store a
    /// zero subtype data offset. Several other subtypes have a block of
    /// nothing but padding, which still gets an offset.
    fn dataless(region_type: RegionType) -> Option<RegionData> {
        match region_type {
            RegionType::WindArea => Some(RegionData::WindArea),
            RegionType::MufflingPlane => Some(RegionData::MufflingPlane),
            RegionType::MapPointDiscoveryOverride => Some(RegionData::MapPointDiscoveryOverride),
            RegionType::MapPointParticipationOverride => {
                Some(RegionData::MapPointParticipationOverride)
            }
            RegionType::EnvironmentMapOutput => Some(RegionData::EnvironmentMapOutput),
            RegionType::Other => Some(RegionData::Other),
            _ => None,
        }
    }

    fn has_block(&self) -> bool {
        Self::dataless(self.region_type()).is_none()
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            RegionData::InvasionPoint { priority } => {
                writer.write_i32::<LittleEndian>(*priority)?;
            }
            RegionData::EnvironmentMapPoint {
                unk00,
                unk04,
                unk0c,
                unk0d,
                unk0e,
                unk0f,
                unk10,
                unk14,
                map_id,
                unk20,
                unk24,
                unk28,
                unk2c,
                unk2d,
            } => {
                writer.write_f32::<LittleEndian>(*unk00)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
                write_zeroes(writer, 4)?;
                writer.write_u8(*unk0c)?;
                writer.write_u8(*unk0d)?;
                writer.write_u8(*unk0e)?;
                writer.write_u8(*unk0f)?;
                writer.write_f32::<LittleEndian>(*unk10)?;
                writer.write_f32::<LittleEndian>(*unk14)?;
                writer.write_i32::<LittleEndian>(*map_id)?;
                write_zeroes(writer, 4)?;
                writer.write_i32::<LittleEndian>(*unk20)?;
                writer.write_i32::<LittleEndian>(*unk24)?;
                writer.write_i32::<LittleEndian>(*unk28)?;
                writer.write_u8(*unk2c)?;
                writer.write_u8(*unk2d)?;
                write_zeroes(writer, 2)?;
            }
            RegionData::Sound(sound) => sound.put(writer)?,
            RegionData::VFX { effect_id, unk04 } => {
                writer.write_i32::<LittleEndian>(*effect_id)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
            }
            RegionData::WindVFX {
                effect_id,
                wind_region,
                unk08,
            } => {
                writer.write_i32::<LittleEndian>(*effect_id)?;
                wind_region.put(writer)?;
                writer.write_f32::<LittleEndian>(*unk08)?;
            }
            RegionData::Message {
                message_id,
                unk02,
                hidden,
                unk08,
                unk0c,
                enable_event_flag_id,
                character_model_name,
                character_id,
                animation_id,
                player_id,
            } => {
                writer.write_i16::<LittleEndian>(*message_id)?;
                writer.write_i16::<LittleEndian>(*unk02)?;
                writer.write_i32::<LittleEndian>(i32::from(*hidden))?;
                writer.write_i32::<LittleEndian>(*unk08)?;
                writer.write_i32::<LittleEndian>(*unk0c)?;
                writer.write_u32::<LittleEndian>(*enable_event_flag_id)?;
                writer.write_i32::<LittleEndian>(*character_model_name)?;
                writer.write_i32::<LittleEndian>(*character_id)?;
                writer.write_i32::<LittleEndian>(*animation_id)?;
                writer.write_i32::<LittleEndian>(*player_id)?;
            }
            RegionData::EnvironmentMapEffectBox {
                enable_dist,
                transition_dist,
                unk08,
                unk09,
                unk0a,
                unk24,
                unk28,
                unk2c,
                unk2e,
                unk2f,
                unk30,
                unk33,
                unk34,
                unk36,
            } => {
                writer.write_f32::<LittleEndian>(*enable_dist)?;
                writer.write_f32::<LittleEndian>(*transition_dist)?;
                writer.write_u8(*unk08)?;
                writer.write_u8(*unk09)?;
                writer.write_i16::<LittleEndian>(*unk0a)?;
                write_zeroes(writer, 24)?;
                writer.write_f32::<LittleEndian>(*unk24)?;
                writer.write_f32::<LittleEndian>(*unk28)?;
                writer.write_i16::<LittleEndian>(*unk2c)?;
                writer.write_u8(*unk2e)?;
                writer.write_u8(*unk2f)?;
                writer.write_i16::<LittleEndian>(*unk30)?;
                write_zeroes(writer, 1)?;
                writer.write_u8(*unk33)?;
                writer.write_i16::<LittleEndian>(*unk34)?;
                writer.write_i16::<LittleEndian>(*unk36)?;
            }
            RegionData::Connection(connection) => connection.put(writer)?,
            RegionData::MufflingBox {
                unk00,
                unk24,
                unk34,
                unk3c,
                unk40,
                unk44,
            } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
                write_zeroes(writer, 32)?;
                writer.write_f32::<LittleEndian>(*unk24)?;
                write_zeroes(writer, 12)?;
                writer.write_f32::<LittleEndian>(*unk34)?;
                write_zeroes(writer, 4)?;
                writer.write_f32::<LittleEndian>(*unk3c)?;
                writer.write_f32::<LittleEndian>(*unk40)?;
                writer.write_f32::<LittleEndian>(*unk44)?;
            }
            RegionData::MufflingPortal { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
                write_zeroes(writer, 12)?;
            }
            RegionData::OtherSound {
                unk00,
                unk01,
                unk02,
                unk03,
                unk04,
                unk08,
                unk0a,
                unk0c,
            } => {
                writer.write_u8(*unk00)?;
                writer.write_u8(*unk01)?;
                writer.write_u8(*unk02)?;
                writer.write_u8(*unk03)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
                writer.write_i16::<LittleEndian>(*unk08)?;
                writer.write_i16::<LittleEndian>(*unk0a)?;
                writer.write_u8(*unk0c)?;
                write_zeroes(writer, 3)?;
            }
            RegionData::PatrolRoute { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
            }
            RegionData::MapPoint {
                unk00,
                unk04,
                unk08,
                unk0c,
                unk14,
                unk18,
            } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
                writer.write_f32::<LittleEndian>(*unk08)?;
                writer.write_f32::<LittleEndian>(*unk0c)?;
                write_zeroes(writer, 4)?;
                writer.write_f32::<LittleEndian>(*unk14)?;
                writer.write_f32::<LittleEndian>(*unk18)?;
            }
            RegionData::WeatherOverride { weather_lot_id } => {
                writer.write_i32::<LittleEndian>(*weather_lot_id)?;
            }
            RegionData::AutoDrawGroupPoint { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
            }
            RegionData::GroupDefeatReward(reward) => reward.put(writer)?,
            RegionData::Hitset { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
            }
            RegionData::FastTravelRestriction { event_flag_id } => {
                writer.write_u32::<LittleEndian>(*event_flag_id)?;
                write_zeroes(writer, 4)?;
            }
            RegionData::PlayArea { unk00, unk04 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
            }
            RegionData::MountJump {
                jump_height,
                unk04,
            } => {
                writer.write_f32::<LittleEndian>(*jump_height)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
            }
            RegionData::Dummy { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
            }
            RegionData::MapNameOverride { map_name_id } => {
                writer.write_i32::<LittleEndian>(*map_name_id)?;
            }
            RegionData::HorseRideOverride { override_type } => {
                writer.write_i32::<LittleEndian>(*override_type as i32)?;
            }
            // Blocks of nothing but padding.
            RegionData::SpawnPoint
            | RegionData::PatrolRoute22
            | RegionData::BuddySummonPoint
            | RegionData::WeatherCreateAssetPoint
            | RegionData::FallPreventionRemoval
            | RegionData::NavmeshCutting
            | RegionData::MountJumpFall => {
                write_zeroes(writer, 4)?;
            }
            // No block at all.
            RegionData::WindArea
            | RegionData::MufflingPlane
            | RegionData::MapPointDiscoveryOverride
            | RegionData::MapPointParticipationOverride
            | RegionData::EnvironmentMapOutput
            | RegionData::Other => {}
        }
        Ok(())
    }
}

/// Child regions of a composite shape, with each slot's pair value.
///
/// These live on the region rather than inside [Shape] so the reference
/// passes only ever walk a flat set of references per entry.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeChildren {
    pub regions: [MsbRef<Region>; 8],
    pub unk04s: [i32; 8],
}

impl Default for CompositeChildren {
    fn default() -> Self {
        Self {
            regions: std::array::from_fn(|_| MsbRef::null()),
            unk04s: [0; 8],
        }
    }
}

/// A functional point or volume in the map.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Region {
    id: EntryId,
    pub name: String,
    pub translate: Vector3,
    /// Euler angles in radians.
    pub rotate: Vector3,
    pub shape: Shape,
    /// Only consulted while the shape is [Shape::Composite].
    pub composite_children: CompositeChildren,
    pub h_unk40: i32,
    pub event_layer: i32,
    pub shorts_a: Vec<i16>,
    pub shorts_b: Vec<i16>,
    pub attached_part: MsbRef<Part>,
    pub d_unk08: u8,
    pub entity_id: u32,
    pub e_unk04: i32,
    pub map_id: i32,
    pub e_unk0c: i32,
    pub data: RegionData,
}

impl Region {
    pub fn new(name: impl Into<String>, data: RegionData) -> Self {
        Self {
            id: EntryId::fresh(),
            name: name.into(),
            translate: Vector3::default(),
            rotate: Vector3::default(),
            shape: Shape::Point,
            composite_children: CompositeChildren::default(),
            h_unk40: 0,
            event_layer: -1,
            shorts_a: Vec::new(),
            shorts_b: Vec::new(),
            attached_part: MsbRef::null(),
            d_unk08: 0,
            entity_id: 0,
            e_unk04: 0,
            map_id: 0,
            e_unk0c: 0,
            data,
        }
    }

    pub fn region_type(&self) -> RegionType {
        self.data.region_type()
    }

    pub(crate) fn resolve_refs(
        &mut self,
        regions: &[EntryKey],
        parts: &[EntryKey],
    ) -> Result<(), MsbError> {
        self.attached_part.resolve(parts)?;
        for child in self.composite_children.regions.iter_mut() {
            child.resolve(regions)?;
        }
        match &mut self.data {
            RegionData::Sound(sound) => {
                for child in sound.child_regions.iter_mut() {
                    child.resolve(regions)?;
                }
            }
            RegionData::WindVFX { wind_region, .. } => wind_region.resolve(regions)?,
            RegionData::GroupDefeatReward(reward) => {
                for part in reward.group_parts.iter_mut() {
                    part.resolve(parts)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn sync_indices(
        &mut self,
        regions: &[EntryKey],
        parts: &[EntryKey],
    ) -> Result<(), MsbError> {
        let name = self.name.clone();
        self.attached_part.sync(&name, parts)?;
        for child in self.composite_children.regions.iter_mut() {
            child.sync(&name, regions)?;
        }
        match &mut self.data {
            RegionData::Sound(sound) => {
                for child in sound.child_regions.iter_mut() {
                    child.sync(&name, regions)?;
                }
            }
            RegionData::WindVFX { wind_region, .. } => wind_region.sync(&name, regions)?,
            RegionData::GroupDefeatReward(reward) => {
                for part in reward.group_parts.iter_mut() {
                    part.sync(&name, parts)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn read_shorts<R: Read + Seek>(reader: &mut R) -> Result<Vec<i16>, MsbError> {
    let count = reader.read_u16::<LittleEndian>()?;
    let mut shorts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        shorts.push(reader.read_i16::<LittleEndian>()?);
    }
    Ok(shorts)
}

fn write_shorts<W: Write + Seek>(writer: &mut W, shorts: &[i16]) -> Result<(), MsbError> {
    writer.write_u16::<LittleEndian>(shorts.len() as u16)?;
    for value in shorts {
        writer.write_i16::<LittleEndian>(*value)?;
    }
    align_writer(writer, 4)?;
    Ok(())
}

impl MsbEntry for Region {
    const PARAM_NAME: &'static str = "POINT_PARAM_ST";

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn subtype_tag(&self) -> u32 {
        self.region_type() as u32
    }

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let start = reader.stream_position()?;
        let header: RegionHeader = read_record(reader)?;

        let region_type = RegionType::from_raw(header.region_subtype).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown region subtype tag {:#x}", header.region_subtype),
            )
        })?;
        let shape_type = ShapeType::from_raw(header.shape_type).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown shape tag {:#x}", header.shape_type),
            )
        })?;

        reader.seek(SeekFrom::Start(start + header.name_offset as u64))?;
        let name = read_utf16(reader)?;

        reader.seek(SeekFrom::Start(start + header.shorts_a_offset as u64))?;
        let shorts_a = read_shorts(reader)?;

        reader.seek(SeekFrom::Start(start + header.shorts_b_offset as u64))?;
        let shorts_b = read_shorts(reader)?;

        reader.seek(SeekFrom::Start(start + header.part_data_offset as u64))?;
        let attached_part = reader.read_le::<MsbRef<Part>>()?;
        reader.seek(SeekFrom::Current(4))?;
        let d_unk08 = reader.read_le::<u8>()?;

        reader.seek(SeekFrom::Start(start + header.entity_data_offset as u64))?;
        let entity_id = reader.read_le::<u32>()?;
        let e_unk04 = reader.read_le::<i32>()?;
        let map_id = reader.read_le::<i32>()?;
        let e_unk0c = reader.read_le::<i32>()?;

        let mut composite_children = CompositeChildren::default();
        let shape = match shape_type {
            ShapeType::Point => {
                if header.shape_data_offset != 0 {
                    return Err(MsbError::format(
                        start,
                        "point shapes must not have shape data",
                    ));
                }
                Shape::Point
            }
            other => {
                if header.shape_data_offset == 0 {
                    return Err(MsbError::format(
                        start,
                        format!("missing shape data for {other:?} shape"),
                    ));
                }
                reader.seek(SeekFrom::Start(start + header.shape_data_offset as u64))?;
                if other == ShapeType::Composite {
                    for i in 0..8 {
                        composite_children.regions[i] = reader.read_le::<MsbRef<Region>>()?;
                        composite_children.unk04s[i] = reader.read_le::<i32>()?;
                    }
                    Shape::Composite
                } else {
                    Shape::read_data(reader, other)?
                }
            }
        };

        let data = match RegionData::dataless(region_type) {
            Some(data) if header.subtype_data_offset == 0 => data,
            Some(_) => {
                return Err(MsbError::format(
                    start,
                    format!("unexpected subtype data for {region_type:?} region"),
                ));
            }
            None if header.subtype_data_offset == 0 => {
                return Err(MsbError::format(
                    start,
                    format!("missing subtype data for {region_type:?} region"),
                ));
            }
            None => {
                reader.seek(SeekFrom::Start(start + header.subtype_data_offset as u64))?;
                reader.read_le_args::<RegionData>((header.region_subtype,))?
            }
        };

        Ok(Self {
            id: EntryId::fresh(),
            name,
            translate: header.translate,
            rotate: header.rotate,
            shape,
            composite_children,
            h_unk40: header.h_unk40,
            event_layer: header.event_layer,
            shorts_a,
            shorts_b,
            attached_part,
            d_unk08,
            entity_id,
            e_unk04,
            map_id,
            e_unk0c,
            data,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError> {
        let start = writer.stream_position()?;
        let mut reservations = Reservations::new();
        reservations.reserve_record::<RegionHeader, _>(writer)?;

        let name_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.name)?;
        align_writer(writer, 4)?;

        let shorts_a_offset = (writer.stream_position()? - start) as i64;
        write_shorts(writer, &self.shorts_a)?;

        let shorts_b_offset = (writer.stream_position()? - start) as i64;
        write_shorts(writer, &self.shorts_b)?;

        let part_data_offset = (writer.stream_position()? - start) as i64;
        self.attached_part.put(writer)?;
        write_zeroes(writer, 4)?;
        writer.write_u8(self.d_unk08)?;
        write_zeroes(writer, 3)?;

        let entity_data_offset = (writer.stream_position()? - start) as i64;
        writer.write_u32::<LittleEndian>(self.entity_id)?;
        writer.write_i32::<LittleEndian>(self.e_unk04)?;
        writer.write_i32::<LittleEndian>(self.map_id)?;
        writer.write_i32::<LittleEndian>(self.e_unk0c)?;

        let shape_data_offset = match &self.shape {
            Shape::Point => 0,
            Shape::Composite => {
                let offset = (writer.stream_position()? - start) as i64;
                for i in 0..8 {
                    self.composite_children.regions[i].put(writer)?;
                    writer.write_i32::<LittleEndian>(self.composite_children.unk04s[i])?;
                }
                offset
            }
            shape => {
                let offset = (writer.stream_position()? - start) as i64;
                shape.put_data(writer)?;
                offset
            }
        };

        let subtype_data_offset = if self.data.has_block() {
            align_writer(writer, 8)?;
            let offset = (writer.stream_position()? - start) as i64;
            self.data.put(writer)?;
            offset
        } else {
            0
        };

        align_writer(writer, 8)?;

        reservations.fill_record(
            writer,
            &RegionHeader {
                name_offset,
                region_subtype: self.subtype_tag(),
                subtype_index,
                shape_type: self.shape.shape_type() as u32,
                translate: self.translate,
                rotate: self.rotate,
                pad2c: 0,
                shorts_a_offset,
                shorts_b_offset,
                h_unk40: self.h_unk40,
                event_layer: self.event_layer,
                part_data_offset,
                entity_data_offset,
                shape_data_offset,
                subtype_data_offset,
            },
        )?;
        reservations.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn hex_bytes(hex: &str) -> Vec<u8> {
        // Remove any whitespace used to make the tests more readable.
        let no_whitespace: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(no_whitespace).unwrap()
    }

    #[test]
    fn dummy_region_round_trip() {
        let mut region = Region::new("dummy point", RegionData::Dummy { unk00: 5 });
        region.translate = Vector3::new(1.0, 2.0, 3.0);
        region.rotate = Vector3::new(0.0, 1.5707964, 0.0);
        region.shape = Shape::Box {
            width: 2.0,
            depth: 4.0,
            height: 1.0,
        };
        region.shorts_a = vec![1, -2, 3];
        region.h_unk40 = 9;
        region.entity_id = 2041360000;
        region.map_id = 10_00_00_00;

        let mut writer = Cursor::new(Vec::new());
        region.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Region::read(&mut reader).unwrap();
        assert_eq!(region.name, read_back.name);
        assert_eq!(region.translate, read_back.translate);
        assert_eq!(region.rotate, read_back.rotate);
        assert_eq!(region.shape, read_back.shape);
        assert_eq!(region.shorts_a, read_back.shorts_a);
        assert!(read_back.shorts_b.is_empty());
        assert_eq!(9, read_back.h_unk40);
        assert_eq!(-1, read_back.event_layer);
        assert_eq!(region.entity_id, read_back.entity_id);
        assert_eq!(region.map_id, read_back.map_id);
        assert_eq!(region.data, read_back.data);
    }

    #[test]
    fn sound_region_round_trip() {
        let sound = SoundData {
            sound_type: 1,
            sound_id: 100500,
            unk49: 1,
            ..SoundData::default()
        };
        let region = Region::new("ambient", RegionData::Sound(sound));

        let mut writer = Cursor::new(Vec::new());
        region.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Region::read(&mut reader).unwrap();
        match read_back.data {
            RegionData::Sound(sound) => {
                assert_eq!(1, sound.sound_type);
                assert_eq!(100500, sound.sound_id);
                assert_eq!(1, sound.unk49);
                assert!(sound.child_regions.iter().all(|r| !r.is_set()));
            }
            other => panic!("expected sound data, got {other:?}"),
        }
    }

    #[test]
    fn pad_only_subtype_block_round_trip() {
        let region = Region::new("spawn", RegionData::SpawnPoint);

        let mut writer = Cursor::new(Vec::new());
        region.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Region::read(&mut reader).unwrap();
        assert_eq!(RegionData::SpawnPoint, read_back.data);
    }

    #[test]
    fn no_block_subtype_writes_zero_offset() {
        let region = Region::new("wind", RegionData::WindArea);

        let mut writer = Cursor::new(Vec::new());
        region.write(&mut writer, 0).unwrap();
        let bytes = writer.into_inner();

        // subtype_data_offset sits at 0x60 in the header.
        assert_eq!(&[0u8; 8][..], &bytes[0x60..0x68]);

        let mut reader = Cursor::new(bytes);
        let read_back = Region::read(&mut reader).unwrap();
        assert_eq!(RegionData::WindArea, read_back.data);
    }

    #[test]
    fn message_hidden_is_32_bits_and_accepts_any_nonzero() {
        // message_id 1, then hidden stored as 32-bit 2.
        let block = hex_bytes(
            "0100 0000 02000000 00000000 00000000
             00000000 00000000 00000000 00000000 00000000",
        );
        let mut reader = Cursor::new(block);
        let data = reader.read_le_args::<RegionData>((RegionType::Message as u32,)).unwrap();
        match &data {
            RegionData::Message {
                message_id, hidden, ..
            } => {
                assert_eq!(1, *message_id);
                assert!(*hidden);

                // Writing normalizes the flag to exactly 1.
                let mut writer = Cursor::new(Vec::new());
                data.put(&mut writer).unwrap();
                assert_eq!(
                    hex_bytes(
                        "0100 0000 01000000 00000000 00000000
                         00000000 00000000 00000000 00000000 00000000"
                    ),
                    writer.into_inner()
                );
            }
            other => panic!("expected message data, got {other:?}"),
        }
    }

    #[test]
    fn horse_ride_override_rejects_unknown_value() {
        let mut reader = Cursor::new(hex_bytes("05000000"));
        let result = reader.read_le_args::<RegionData>((RegionType::HorseRideOverride as u32,));
        assert!(result.is_err());
    }

    #[test]
    fn point_region_has_no_shape_data() {
        let region = Region::new("point", RegionData::Other);

        let mut writer = Cursor::new(Vec::new());
        region.write(&mut writer, 0).unwrap();
        let bytes = writer.into_inner();

        // shape_data_offset sits at 0x58 in the header.
        assert_eq!(&[0u8; 8][..], &bytes[0x58..0x60]);
    }
}
