//! Update container integration tests

use esprov::efu;
use esprov::filesys::dir::Dir;

#[tokio::test]
async fn test_build_and_read_round_trip() {
    let dir = Dir::create_temp_dir("esprov-efu").await.unwrap();

    let firmware: Vec<u8> = b"firmware-image-bytes".to_vec();
    // over 255 bytes, which the legacy single-byte length field could
    // not have represented
    let filesystem: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();

    let fw_file = dir.file("app.bin");
    let fs_file = dir.file("filesystem.bin");
    let target = dir.file("update.efu");
    fw_file.write_bytes(&firmware).await.unwrap();
    fs_file.write_bytes(&filesystem).await.unwrap();

    efu::build(fw_file.path(), fs_file.path(), target.path())
        .await
        .unwrap();

    // signature + version + two (type, length, data) records, nothing else
    let expected_len = 4 + 2 + (2 + 4 + firmware.len()) + (2 + 4 + filesystem.len());
    assert_eq!(target.len().await.unwrap(), expected_len as u64);

    let records = efu::read(target.path()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].record_type, efu::RecordType::FirmwareImage as u16);
    assert_eq!(records[0].data, firmware);
    assert_eq!(records[1].record_type, efu::RecordType::FilesystemImage as u16);
    assert_eq!(records[1].data, filesystem);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_build_fails_on_missing_source() {
    let dir = Dir::create_temp_dir("esprov-efu").await.unwrap();

    let fs_file = dir.file("filesystem.bin");
    fs_file.write_bytes(b"fs").await.unwrap();

    let missing = dir.file("no-such-app.bin");
    let target = dir.file("update.efu");
    let result = efu::build(missing.path(), fs_file.path(), target.path()).await;
    assert!(result.is_err());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_read_rejects_foreign_files() {
    let dir = Dir::create_temp_dir("esprov-efu").await.unwrap();

    let bogus = dir.file("bogus.efu");
    bogus.write_bytes(b"not a container at all").await.unwrap();
    assert!(efu::read(bogus.path()).await.is_err());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_read_rejects_truncated_record() {
    let dir = Dir::create_temp_dir("esprov-efu").await.unwrap();

    // header + record claiming 100 bytes but carrying only 3
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&efu::SIGNATURE);
    bytes.extend_from_slice(&efu::VERSION.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(&[1, 2, 3]);

    let truncated = dir.file("truncated.efu");
    truncated.write_bytes(&bytes).await.unwrap();
    assert!(efu::read(truncated.path()).await.is_err());

    dir.delete().await.unwrap();
}
