use packvault::filter::FilterOptions;
use packvault::pipeline::{backup, restore, BackupOptions, EngineError, RestoreOptions};
use packvault::{CipherId, CodecId, ContainerFormat};
use std::path::Path;
use tempfile::TempDir;

fn make_source(dir: &Path) {
    std::fs::create_dir_all(dir.join("docs")).unwrap();
    std::fs::write(dir.join("a.txt"), b"abc").unwrap();
    std::fs::write(dir.join("docs/b.txt"), b"").unwrap();
    std::fs::write(dir.join("docs/notes.md"), b"# notes\nsome repeated text text text\n").unwrap();
    std::fs::write(dir.join("blob.bin"), vec![42u8; 4096]).unwrap();
}

fn assert_tree_restored(dir: &Path) {
    assert_eq!(std::fs::read(dir.join("a.txt")).unwrap(), b"abc");
    assert_eq!(std::fs::read(dir.join("docs/b.txt")).unwrap(), b"");
    assert_eq!(
        std::fs::read(dir.join("docs/notes.md")).unwrap(),
        b"# notes\nsome repeated text text text\n"
    );
    assert_eq!(std::fs::read(dir.join("blob.bin")).unwrap(), vec![42u8; 4096]);
}

fn run_roundtrip(format: ContainerFormat, codec: CodecId, cipher: Option<CipherId>) {
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    make_source(&source);

    let mut opts = BackupOptions::new(&source, work.path().join("backups"));
    opts.format = format;
    opts.codec = codec;
    opts.cipher = cipher;
    if cipher.is_some() {
        opts.password = Some("integration secret".into());
    }
    let archive = backup(&opts).unwrap();
    assert!(archive.exists());

    // Only the final artifact may remain in the backup directory.
    let leftovers: Vec<_> = std::fs::read_dir(work.path().join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "stage temp files left behind: {:?}", leftovers);

    let out = work.path().join("restored");
    restore(&RestoreOptions {
        archive,
        target_dir: out.clone(),
        password: cipher.map(|_| "integration secret".into()),
    })
    .unwrap();
    assert_tree_restored(&out);

    // Restore temp files must be gone as well.
    assert!(!out.join("restore_decrypt.tmp").exists());
    assert!(!out.join("restore_uncompress.tmp").exists());
}

#[test]
fn roundtrip_every_container_format() {
    for format in [ContainerFormat::Tar, ContainerFormat::Zip, ContainerFormat::Custom] {
        run_roundtrip(format, CodecId::None, None);
    }
}

#[test]
fn roundtrip_with_compression() {
    run_roundtrip(ContainerFormat::Tar, CodecId::Huffman, None);
    run_roundtrip(ContainerFormat::Zip, CodecId::Huffman, None);
    run_roundtrip(ContainerFormat::Custom, CodecId::Huffman, None);
}

#[test]
fn roundtrip_with_encryption() {
    run_roundtrip(ContainerFormat::Tar, CodecId::None, Some(CipherId::Aes256Cbc));
    run_roundtrip(ContainerFormat::Tar, CodecId::Huffman, Some(CipherId::Aes256Cbc));
    run_roundtrip(ContainerFormat::Custom, CodecId::Huffman, Some(CipherId::Aes256Gcm));
}

#[test]
fn roundtrip_lz77_over_ascii_tree() {
    // LZ77 round-trip is only guaranteed for bytes < 0x80; tar headers and
    // ASCII contents stay inside that boundary.
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    std::fs::write(source.join("poem.txt"), b"tiger tiger burning bright\n".repeat(40)).unwrap();
    std::fs::write(source.join("notes.txt"), b"plain ascii notes").unwrap();

    let mut opts = BackupOptions::new(&source, work.path().join("backups"));
    opts.format = ContainerFormat::Tar;
    opts.codec = CodecId::Lz77;
    let archive = backup(&opts).unwrap();

    let out = work.path().join("restored");
    restore(&RestoreOptions { archive, target_dir: out.clone(), password: None }).unwrap();
    assert_eq!(
        std::fs::read(out.join("poem.txt")).unwrap(),
        b"tiger tiger burning bright\n".repeat(40)
    );
    assert_eq!(std::fs::read(out.join("notes.txt")).unwrap(), b"plain ascii notes");
}

#[test]
fn wrong_password_aborts_restore() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    make_source(&source);

    let mut opts = BackupOptions::new(&source, work.path().join("backups"));
    opts.cipher = Some(CipherId::Aes256Cbc);
    opts.password = Some("right".into());
    let archive = backup(&opts).unwrap();

    let err = restore(&RestoreOptions {
        archive: archive.clone(),
        target_dir: work.path().join("restored"),
        password: Some("wrong".into()),
    })
    .unwrap_err();
    assert!(matches!(err, EngineError::Encryption(_)));

    let err = restore(&RestoreOptions {
        archive,
        target_dir: work.path().join("restored"),
        password: None,
    })
    .unwrap_err();
    assert!(matches!(err, EngineError::Encryption(_)));
}

#[test]
fn uncompressed_archive_survives_decompression_trials() {
    // Restore always tries LZ77 then Huffman first; a plain container must
    // come through the fallback unharmed.
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    make_source(&source);

    let opts = BackupOptions::new(&source, work.path().join("backups"));
    let archive = backup(&opts).unwrap();

    let out = work.path().join("restored");
    restore(&RestoreOptions { archive, target_dir: out.clone(), password: None }).unwrap();
    assert_tree_restored(&out);
}

#[test]
fn overwrite_policy_picks_alternate_name() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    make_source(&source);

    let opts = BackupOptions::new(&source, work.path().join("backups"));
    let first = backup(&opts).unwrap();
    let second = backup(&opts).unwrap();
    assert_ne!(first, second);
    assert!(first.exists());
    assert!(second.exists());

    let mut opts = BackupOptions::new(&source, work.path().join("backups"));
    opts.overwrite = true;
    let third = backup(&opts).unwrap();
    assert_eq!(third, first);
}

#[test]
fn filtered_backup_excludes_entries() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("source");
    std::fs::create_dir(&source).unwrap();
    make_source(&source);

    let mut opts = BackupOptions::new(&source, work.path().join("backups"));
    opts.filter = FilterOptions {
        exclude_name: Some(regex::Regex::new(r"\.bin$").unwrap()),
        ..Default::default()
    };
    let archive = backup(&opts).unwrap();

    let out = work.path().join("restored");
    restore(&RestoreOptions { archive, target_dir: out.clone(), password: None }).unwrap();
    assert!(out.join("a.txt").exists());
    assert!(!out.join("blob.bin").exists());
}

#[test]
fn restore_preserves_unix_mode() {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let work = TempDir::new().unwrap();
        let source = work.path().join("source");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("script.sh"), b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(
            source.join("script.sh"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();

        let mut opts = BackupOptions::new(&source, work.path().join("backups"));
        opts.format = ContainerFormat::Custom;
        let archive = backup(&opts).unwrap();

        let out = work.path().join("restored");
        restore(&RestoreOptions { archive, target_dir: out.clone(), password: None }).unwrap();
        let mode = std::fs::metadata(out.join("script.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o755);
    }
}

#[test]
fn empty_source_directory_reports_no_files() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("empty");
    std::fs::create_dir(&source).unwrap();

    let opts = BackupOptions::new(&source, work.path().join("backups"));
    assert!(matches!(backup(&opts), Err(EngineError::NoFilesSelected)));
}

#[test]
fn restore_of_garbage_fails_with_pack_error() {
    let work = TempDir::new().unwrap();
    let bogus = work.path().join("bogus.pack");
    std::fs::write(&bogus, b"this is not an archive of any kind").unwrap();

    let err = restore(&RestoreOptions {
        archive: bogus,
        target_dir: work.path().join("restored"),
        password: None,
    })
    .unwrap_err();
    assert!(matches!(err, EngineError::Pack(_)));
}
