use std::io::{Cursor, Read, Write};

use cabinet_engine::{CabinetBuilder, CompressionType, SearchOptions};

#[test]
fn search_finds_a_cabinet_embedded_after_other_data() {
    let mut cab_builder = CabinetBuilder::new();
    cab_builder
        .add_folder(CompressionType::None)
        .add_file("hi.txt");
    let mut cab_writer = cab_builder.build(Cursor::new(Vec::new())).unwrap();
    while let Some(mut file_writer) = cab_writer.next_file().unwrap() {
        file_writer.write_all(b"hello").unwrap();
    }
    let cab_bytes = cab_writer.finish().unwrap().into_inner();

    let mut blob = vec![0u8; 57];
    blob.extend_from_slice(&cab_bytes);
    blob.extend_from_slice(b"trailing junk");

    let found =
        cabinet_engine::search(Cursor::new(blob.clone()), SearchOptions::default())
            .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].offset, 57);
    assert_eq!(found[0].length as usize, cab_bytes.len());

    let mut cabinet = cabinet_engine::Cabinet::new(
        cabinet_engine::OffsetReader::new(Cursor::new(blob), found[0].offset).unwrap(),
    )
    .unwrap();
    let mut output = Vec::new();
    cabinet.read_file("hi.txt").unwrap().read_to_end(&mut output).unwrap();
    assert_eq!(output, b"hello");
}
