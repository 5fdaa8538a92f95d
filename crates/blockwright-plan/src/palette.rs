//! Built-in material colour table and nearest-colour matching.

use blockwright_types::{MaterialId, PaletteSelection};

/// Material used when a palette subset is empty.
pub const FALLBACK_MATERIAL: &str = "white_wool";

/// One material and its representative colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Material name.
    pub name: &'static str,
    /// Representative RGB colour.
    pub rgb: [u8; 3],
}

const fn entry(name: &'static str, hex: u32) -> PaletteEntry {
    let [_, r, g, b] = hex.to_be_bytes();
    PaletteEntry { name, rgb: [r, g, b] }
}

/// Every known material, in matching priority order.
pub const PALETTE: [PaletteEntry; 40] = [
    entry("white_wool", 0x00E9_ECEC),
    entry("light_gray_wool", 0x009A_A1A1),
    entry("gray_wool", 0x004C_4F51),
    entry("black_wool", 0x001E_1B1B),
    entry("brown_wool", 0x008E_5C42),
    entry("red_wool", 0x00A1_2722),
    entry("orange_wool", 0x00EA_7E35),
    entry("yellow_wool", 0x00FE_CB00),
    entry("lime_wool", 0x0070_B919),
    entry("green_wool", 0x005B_7F1E),
    entry("cyan_wool", 0x0015_7788),
    entry("light_blue_wool", 0x003A_AFD9),
    entry("blue_wool", 0x0035_4F9C),
    entry("purple_wool", 0x007E_3DB5),
    entry("magenta_wool", 0x00BE_49C9),
    entry("pink_wool", 0x00EE_8DAC),
    entry("white_concrete", 0x00CF_D5D6),
    entry("light_gray_concrete", 0x007D_7D73),
    entry("gray_concrete", 0x0036_393D),
    entry("black_concrete", 0x0008_0A0F),
    entry("brown_concrete", 0x0060_3B1F),
    entry("red_concrete", 0x008E_2121),
    entry("orange_concrete", 0x00E0_6101),
    entry("yellow_concrete", 0x00F4_AF15),
    entry("lime_concrete", 0x005E_A918),
    entry("green_concrete", 0x0049_5B24),
    entry("cyan_concrete", 0x0015_7788),
    entry("light_blue_concrete", 0x0029_A4C7),
    entry("blue_concrete", 0x002C_2E8F),
    entry("purple_concrete", 0x0064_209C),
    entry("magenta_concrete", 0x00A9_309F),
    entry("pink_concrete", 0x00D5_668E),
    entry("dirt", 0x0086_6043),
    entry("cobblestone", 0x007F_7F7F),
    entry("stone", 0x007D_7D7D),
    entry("oak_planks", 0x009C_7F4E),
    entry("birch_planks", 0x00D7_CB8D),
    entry("spruce_planks", 0x0080_5E36),
    entry("sand", 0x00DB_D3A0),
    entry("gravel", 0x007E_7E7E),
];

const BASIC: [&str; 4] = ["dirt", "cobblestone", "stone", "oak_planks"];

/// Whether `entry` belongs to the selected subset.
pub fn includes(selection: PaletteSelection, entry: &PaletteEntry) -> bool {
    match selection {
        PaletteSelection::Wool => entry.name.ends_with("_wool"),
        PaletteSelection::Concrete => entry.name.ends_with("_concrete"),
        PaletteSelection::Basic => BASIC.contains(&entry.name),
        PaletteSelection::All => true,
    }
}

/// Palette entries of a subset, in table order.
pub fn subset(selection: PaletteSelection) -> impl Iterator<Item = &'static PaletteEntry> {
    PALETTE.iter().filter(move |e| includes(selection, e))
}

fn squared_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter().zip(b.iter()).fold(0_u32, |acc, (x, y)| {
        let d = u32::from(x.abs_diff(*y));
        acc.saturating_add(d.saturating_mul(d))
    })
}

/// Closest material to `rgb` within the subset.
///
/// Ties go to the entry that appears first in [`PALETTE`], so matching is
/// deterministic.
pub fn nearest(selection: PaletteSelection, rgb: [u8; 3]) -> MaterialId {
    let mut best: Option<(&PaletteEntry, u32)> = None;
    for candidate in subset(selection) {
        let distance = squared_distance(candidate.rgb, rgb);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    MaterialId::from(best.map_or(FALLBACK_MATERIAL, |(e, _)| e.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsets_have_expected_sizes() {
        assert_eq!(subset(PaletteSelection::Wool).count(), 16);
        assert_eq!(subset(PaletteSelection::Concrete).count(), 16);
        assert_eq!(subset(PaletteSelection::Basic).count(), 4);
        assert_eq!(subset(PaletteSelection::All).count(), 40);
    }

    #[test]
    fn exact_colour_matches_its_material() {
        assert_eq!(
            nearest(PaletteSelection::Wool, [0xA1, 0x27, 0x22]).as_str(),
            "red_wool"
        );
        assert_eq!(
            nearest(PaletteSelection::Concrete, [0x08, 0x0A, 0x0F]).as_str(),
            "black_concrete"
        );
    }

    #[test]
    fn selection_restricts_candidates() {
        let pure_red = [255, 0, 0];
        assert!(nearest(PaletteSelection::Wool, pure_red).as_str().ends_with("_wool"));
        let basic = nearest(PaletteSelection::Basic, pure_red);
        assert!(BASIC.contains(&basic.as_str()));
    }

    #[test]
    fn ties_resolve_to_the_earlier_entry() {
        // cyan_wool and cyan_concrete share a colour.
        assert_eq!(
            nearest(PaletteSelection::All, [0x15, 0x77, 0x88]).as_str(),
            "cyan_wool"
        );
    }
}
