//! Sponge schematic (`.schem`) → placement plan.
//!
//! Versions 2 and 3 are supported. Both store a palette of block-state
//! strings and a varint-encoded block array whose index is
//! `x + z * width + y * width * length`. Ops are emitted in that native
//! order; nothing is resampled.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use serde::Deserialize;

use blockwright_types::{BlockPos, Dimensions, MaterialId, PlacementOp, PlacementPlan};

use crate::error::PlanError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const AIR_BLOCKS: [&str; 3] = ["air", "cave_air", "void_air"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpongeV2 {
    width: i16,
    height: i16,
    length: i16,
    palette: HashMap<String, i32>,
    block_data: fastnbt::ByteArray,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpongeV3Blocks {
    palette: HashMap<String, i32>,
    data: fastnbt::ByteArray,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpongeV3Body {
    width: i16,
    height: i16,
    length: i16,
    blocks: SpongeV3Blocks,
}

#[derive(Debug, Deserialize)]
struct SpongeV3 {
    #[serde(rename = "Schematic")]
    schematic: SpongeV3Body,
}

struct Decoded {
    dimensions: Dimensions,
    palette: HashMap<String, i32>,
    data: Vec<u8>,
}

/// Reduce a block-state string to a bare material name.
///
/// `minecraft:oak_stairs[facing=east]` becomes `oak_stairs`.
pub fn normalize_block_state(state: &str) -> MaterialId {
    let without_state = state.split('[').next().unwrap_or(state);
    let bare = without_state
        .rsplit_once(':')
        .map_or(without_state, |(_, name)| name);
    MaterialId::from(bare.trim())
}

fn is_air(material: &MaterialId) -> bool {
    AIR_BLOCKS.contains(&material.as_str())
}

fn extent(value: i16) -> u32 {
    u32::from(u16::from_ne_bytes(value.to_ne_bytes()))
}

fn unsigned_bytes(array: &fastnbt::ByteArray) -> Vec<u8> {
    array
        .iter()
        .map(|b| u8::from_ne_bytes(b.to_ne_bytes()))
        .collect()
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, PlanError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| PlanError::MalformedBlueprint {
            reason: format!("gzip: {e}"),
        })?;
    Ok(out)
}

fn decode(raw: &[u8]) -> Result<Decoded, PlanError> {
    if let Ok(v3) = fastnbt::from_bytes::<SpongeV3>(raw) {
        let body = v3.schematic;
        return Ok(Decoded {
            dimensions: Dimensions::new(
                extent(body.width),
                extent(body.height),
                extent(body.length),
            ),
            palette: body.blocks.palette,
            data: unsigned_bytes(&body.blocks.data),
        });
    }
    let v2: SpongeV2 = fastnbt::from_bytes(raw)?;
    Ok(Decoded {
        dimensions: Dimensions::new(extent(v2.width), extent(v2.height), extent(v2.length)),
        palette: v2.palette,
        data: unsigned_bytes(&v2.block_data),
    })
}

/// Decode a varint stream into palette indices.
fn read_varints(data: &[u8]) -> Result<Vec<u32>, PlanError> {
    let mut values = Vec::new();
    let mut value: u32 = 0;
    let mut shift: u32 = 0;
    for &byte in data {
        let chunk = u32::from(byte & 0x7F);
        let shifted = chunk
            .checked_shl(shift)
            .ok_or_else(|| PlanError::MalformedBlueprint {
                reason: "varint too long".to_owned(),
            })?;
        value |= shifted;
        if byte & 0x80 == 0 {
            values.push(value);
            value = 0;
            shift = 0;
        } else {
            shift = shift.saturating_add(7);
        }
    }
    if shift != 0 {
        return Err(PlanError::MalformedBlueprint {
            reason: "truncated varint at end of block data".to_owned(),
        });
    }
    Ok(values)
}

/// Compile blueprint bytes (gzip-compressed or raw NBT) into a plan.
pub fn compile_blueprint(bytes: &[u8]) -> Result<PlacementPlan, PlanError> {
    let raw = inflate(bytes)?;
    let decoded = decode(&raw)?;
    let Dimensions {
        width,
        height,
        length,
    } = decoded.dimensions;
    if decoded.dimensions.volume() == 0 {
        return Err(PlanError::EmptyBlueprint {
            width,
            height,
            length,
        });
    }

    let mut by_index: HashMap<u32, MaterialId> = HashMap::with_capacity(decoded.palette.len());
    for (state, id) in &decoded.palette {
        let id = u32::try_from(*id).map_err(|_negative| PlanError::MalformedBlueprint {
            reason: format!("negative palette id for {state}"),
        })?;
        by_index.insert(id, normalize_block_state(state));
    }

    let indices = read_varints(&decoded.data)?;
    let volume = decoded.dimensions.volume();
    if u64::try_from(indices.len()).ok() != Some(volume) {
        return Err(PlanError::MalformedBlueprint {
            reason: format!("{} blocks for volume {volume}", indices.len()),
        });
    }

    let layer = u64::from(width).saturating_mul(u64::from(length));
    let mut ops = Vec::with_capacity(indices.len());
    for (i, palette_id) in (0_u64..).zip(indices) {
        let material = by_index
            .get(&palette_id)
            .ok_or_else(|| PlanError::MalformedBlueprint {
                reason: format!("palette id {palette_id} at block {i} is undefined"),
            })?;
        let position = position_of(i, u64::from(width), layer)?;
        if is_air(material) {
            ops.push(PlacementOp::empty(position));
        } else {
            ops.push(PlacementOp::place(position, material.clone()));
        }
    }

    tracing::debug!(
        dimensions = %decoded.dimensions,
        palette_size = by_index.len(),
        "Compiled blueprint plan"
    );
    Ok(PlacementPlan::new(ops, decoded.dimensions))
}

fn position_of(index: u64, width: u64, layer: u64) -> Result<BlockPos, PlanError> {
    let overflow = || PlanError::MalformedBlueprint {
        reason: format!("block index {index} out of range"),
    };
    let y = index.checked_div(layer).ok_or_else(overflow)?;
    let rem = index.checked_rem(layer).ok_or_else(overflow)?;
    let z = rem.checked_div(width).ok_or_else(overflow)?;
    let x = rem.checked_rem(width).ok_or_else(overflow)?;
    let axis = |v: u64| i32::try_from(v).map_err(|_overflow| overflow());
    Ok(BlockPos::new(axis(x)?, axis(y)?, axis(z)?))
}
