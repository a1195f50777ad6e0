use super::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

fn bundle(members: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let encoder = builder.into_inner().unwrap();
    encoder.finish().unwrap()
}

fn default_exclusions() -> ArchiveExclusions {
    ArchiveExclusions::compile(&[r"\.rules$".to_string(), "^COPYRIGHT$".to_string()]).unwrap()
}

#[test]
fn flattens_member_paths() {
    let bytes = bundle(&[
        ("dist/2024-05-01/nrd-30day", "line-a\n"),
        ("README", "readme"),
    ]);
    let entries = TarGzExtractor.extract(&bytes, &|_| false).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries["nrd-30day"], b"line-a\n".to_vec());
    assert!(entries.contains_key("README"));
}

#[test]
fn drops_excluded_members() {
    let exclusions = default_exclusions();
    let bytes = bundle(&[
        ("pkg/nrd-14day", "data"),
        ("pkg/nrd-14day.rules", "rules"),
        ("pkg/COPYRIGHT", "(c)"),
    ]);
    let entries = TarGzExtractor
        .extract(&bytes, &|name| exclusions.is_excluded(name))
        .unwrap();

    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["nrd-14day"]);
}

#[test]
fn garbage_is_corrupt() {
    let result = TarGzExtractor.extract(b"definitely not gzip", &|_| false);
    assert!(matches!(result, Err(ArchiveError::Corrupt { .. })));
}

#[test]
fn invalid_pattern_is_config_error() {
    let result = ArchiveExclusions::compile(&["(unclosed".to_string()]);
    match result {
        Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("archive.exclude[0]")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn unpacks_expected_entry() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nrd-30day");
    let bytes = bundle(&[("a/b/nrd-30day", "payload"), ("a/COPYRIGHT", "(c)")]);

    let path = unpack_entry(
        &TarGzExtractor,
        &bytes,
        &default_exclusions(),
        "nrd-30day",
        &dest,
    )
    .unwrap();

    assert_eq!(path, dest.join("nrd-30day"));
    assert_eq!(std::fs::read(&path).unwrap(), b"payload");
}

#[test]
fn missing_entry_is_reported() {
    let dir = TempDir::new().unwrap();
    let bytes = bundle(&[("other-file", "x")]);

    let result = unpack_entry(
        &TarGzExtractor,
        &bytes,
        &ArchiveExclusions::default(),
        "nrd-phishing-14day",
        dir.path(),
    );
    assert!(matches!(
        result,
        Err(Error::Archive(ArchiveError::MissingEntry { ref name })) if name == "nrd-phishing-14day"
    ));
}

#[test]
fn excluded_entry_counts_as_missing() {
    let dir = TempDir::new().unwrap();
    let bytes = bundle(&[("COPYRIGHT", "(c)")]);
    let result = unpack_entry(
        &TarGzExtractor,
        &bytes,
        &default_exclusions(),
        "COPYRIGHT",
        dir.path(),
    );
    assert!(matches!(
        result,
        Err(Error::Archive(ArchiveError::MissingEntry { .. }))
    ));
}
