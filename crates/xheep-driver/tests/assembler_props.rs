//! Properties of firmware flattening

use proptest::{collection, prelude::*};
use test_strategy::proptest;
use xheep_driver::firmware::{flatten_into, required_size};
use xheep_driver::{AssemblyWarning, FirmwareImage, Section};

fn gen_section() -> impl Strategy<Value = Section> {
    (0u32..0x4000, collection::vec(any::<u8>(), 0..256))
        .prop_map(|(addr, data)| Section::new(addr, data))
}

fn gen_sections() -> impl Strategy<Value = Vec<Section>> {
    collection::vec(gen_section(), 1..8)
}

/// Index of the last section covering `byte`, if any
fn last_writer(sections: &[Section], byte: usize) -> Option<&Section> {
    sections
        .iter()
        .rev()
        .find(|s| (s.addr as usize..s.end().unwrap()).contains(&byte))
}

#[proptest]
fn size_is_aligned_max_end(#[strategy(gen_sections())] sections: Vec<Section>) {
    let max_end = sections.iter().map(|s| s.end().unwrap()).max().unwrap();
    let size = required_size(&sections).unwrap();

    prop_assert_eq!(size % 8, 0);
    prop_assert!(size >= max_end);
    prop_assert!(size < max_end + 8);
}

#[proptest]
fn bytes_follow_last_write_wins(#[strategy(gen_sections())] sections: Vec<Section>) {
    let image = FirmwareImage::assemble(&sections).unwrap();

    for (byte, &value) in image.as_bytes().iter().enumerate() {
        match last_writer(&sections, byte) {
            Some(s) => prop_assert_eq!(value, s.data[byte - s.addr as usize]),
            None => prop_assert_eq!(value, 0),
        }
    }

    // Every section fits the size it was sized for.
    let out_of_bounds = image
        .warnings()
        .iter()
        .any(|w| matches!(w, AssemblyWarning::OutOfBounds { .. }));
    prop_assert!(!out_of_bounds);
}

#[proptest]
fn out_of_bounds_sections_never_touch_the_buffer(
    #[strategy(gen_sections())] sections: Vec<Section>,
    #[strategy(0usize..0x4000)] buffer_len: usize,
) {
    let mut buffer = vec![0u8; buffer_len];
    let warnings = flatten_into(&sections, &mut buffer);

    let fitting: Vec<Section> = sections
        .iter()
        .filter(|s| s.end().unwrap() <= buffer_len)
        .cloned()
        .collect();

    let skipped = warnings
        .iter()
        .filter(|w| matches!(w, AssemblyWarning::OutOfBounds { .. }))
        .count();
    prop_assert_eq!(skipped, sections.len() - fitting.len());

    for (byte, &value) in buffer.iter().enumerate() {
        let expected = last_writer(&fitting, byte).map_or(0, |s| s.data[byte - s.addr as usize]);
        prop_assert_eq!(value, expected);
    }
}

#[proptest]
fn overlaps_are_flagged_not_counted(
    #[strategy(0u32..64)] addr: u32,
    #[strategy(1usize..32)] len: usize,
    #[strategy(0usize..32)] shift: usize,
) {
    prop_assume!(shift < len);
    let later_addr = addr + shift as u32;
    let sections = vec![
        Section::new(addr, vec![0x11; len]),
        Section::new(later_addr, vec![0x22; len]),
    ];

    let image = FirmwareImage::assemble(&sections).unwrap();
    prop_assert_eq!(
        image.warnings(),
        &[AssemblyWarning::Overlap {
            earlier: 0,
            later: 1
        }]
    );
    prop_assert_eq!(image.as_bytes()[later_addr as usize], 0x22);
}
