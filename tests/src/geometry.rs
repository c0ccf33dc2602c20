use tc_lib::io::dectape::geometry::*;

#[test]
fn blocks_tile_the_tape() {
    for format in Format::ALL {
        let geo = format.geometry();
        assert_eq!(geo.block_start_line(0), END_ZONE_LINES);
        assert_eq!(geo.block_start_line(geo.blocks), geo.forward_end_zone_line());
        assert_eq!(geo.last_line(), geo.forward_end_zone_line() + END_ZONE_LINES);
        for block in [0, 1, geo.blocks / 2, geo.blocks - 1] {
            let start = geo.block_start_line(block);
            let end = start + geo.lines_per_block() - 1;
            assert_eq!(geo.block_of(start), block, "{format} block {block}");
            assert_eq!(geo.block_of(end), block, "{format} block {block}");
            assert_eq!(geo.offset_in_block(end), geo.lines_per_block() - 1);
        }
    }
}

#[test]
fn data_words_map_in_order() {
    let geo = Format::Bits16.geometry();
    let first = geo.block_start_line(9) + HEADER_LINES;
    for word in 0..geo.block_words {
        for line in 0..LINES_PER_WORD {
            assert_eq!(geo.word_index(first + word * LINES_PER_WORD + line), word);
        }
    }
}

#[test]
fn twelve_bit_geometry() {
    let geo = Format::Bits12.geometry();
    assert_eq!(geo.block_words, 86);
    assert_eq!(geo.blocks, 1474);
    assert_eq!(geo.lines_per_block(), 2 * HEADER_LINES + 86 * LINES_PER_WORD);
    assert_eq!(geo.capacity() * 3 / 2 * 2, Format::Bits12.file_bytes());
}

#[test]
fn end_zones_cover_the_leaders() {
    let geo = Format::Bits18.geometry();
    assert!(geo.in_reverse_end_zone(END_ZONE_LINES - 1));
    assert!(!geo.in_reverse_end_zone(END_ZONE_LINES));
    assert!(!geo.in_forward_end_zone(geo.forward_end_zone_line() - 1));
    assert!(geo.in_forward_end_zone(geo.last_line()));
    assert_eq!(geo.buffer_zone_lines(), 200 * LINES_PER_WORD);
}

#[test]
fn format_names() {
    for format in Format::ALL {
        assert_eq!(format.to_string().parse::<Format>(), Ok(format));
    }
    assert_eq!("pdp15".parse::<Format>(), Ok(Format::Bits18));
    assert_eq!("PDP11".parse::<Format>(), Ok(Format::Bits16));
}
