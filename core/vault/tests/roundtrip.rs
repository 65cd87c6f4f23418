//! Build, load and export round trips through real container files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use resvault_common::{CasePolicy, Error, TextEncoding};
use resvault_crypto::{digest, digest_file};
use resvault_storage::INDEX_FILE_NAME;
use resvault_vault::{
    EngineConfig, IndexEntry, BACKUP_FILE_NAME, IndexFile, ProgressEvent, SortBy, VaultEngine, VaultState,
};
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn engine() -> VaultEngine {
    VaultEngine::new(EngineConfig::default()).unwrap()
}

#[test]
fn two_files_share_one_container() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    write(&source, "a.txt", b"0123456789");
    write(&source, "b.bin", &[7u8; 20]);

    let config = EngineConfig {
        max_container_size: 30,
        ..EngineConfig::default()
    };
    let mut engine = VaultEngine::new(config).unwrap();
    engine.build(&source, &temp.path().join("out")).unwrap();

    assert_eq!(engine.row_count(), 2);
    let a = engine.get_entry("a.txt").unwrap();
    let b = engine.get_entry("b.bin").unwrap();
    assert_eq!(a.data_id, 0);
    assert_eq!(b.data_id, 0);
    assert_eq!(b.offset, a.length);
    assert_eq!(b.offset, 10);

    let list = engine.extension_list();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|info| info.count == 1));
}

#[test]
fn build_then_load_reproduces_everything() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "readme.txt", b"plain text");
    write(&source, "scripts/boot.lua", b"print('boot')");
    write(&source, "tables/items.rdb", &[0xAB; 300]);
    write(&source, "maps/field.bin", &(0..=255u8).collect::<Vec<_>>());

    let mut built = engine();
    built.build(&source, &out).unwrap();
    let built_entries = built.entries().to_vec();
    built.close();

    let mut loaded = engine();
    loaded.load(&out.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(loaded.state(), VaultState::Loaded);
    assert_eq!(loaded.row_count(), 4);
    assert_eq!(loaded.entries(), built_entries.as_slice());

    for (name, rel) in [
        ("readme.txt", "readme.txt"),
        ("boot.lua", "scripts/boot.lua"),
        ("items.rdb", "tables/items.rdb"),
        ("field.bin", "maps/field.bin"),
    ] {
        let original = fs::read(source.join(rel)).unwrap();
        assert_eq!(loaded.get_file_bytes(name).unwrap(), original, "{}", name);
        assert!(loaded.compare_with_file(name, &source.join(rel)).unwrap());
    }

    assert!(loaded.extension_encrypted("lua"));
    assert!(loaded.extension_encrypted("rdb"));
    assert!(!loaded.extension_encrypted("bin"));
}

#[test]
fn encrypted_extensions_are_not_stored_in_clear() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    let script = b"-- secret quest logic --".to_vec();
    write(&source, "quest.lua", &script);

    let mut engine = engine();
    engine.build(&source, &out).unwrap();

    let stored = fs::read(out.join("data.001")).unwrap();
    assert_eq!(stored.len(), script.len());
    assert_ne!(stored, script);
    assert_eq!(engine.get_file_bytes("quest.lua").unwrap(), script);
}

#[test]
fn export_digest_matches_source() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    let export = temp.path().join("export");
    write(&source, "a.txt", b"alpha");
    write(&source, "b.lua", b"return 42");
    write(&source, "c.xml", b"<root/>");

    let mut engine = engine();
    engine.build(&source, &out).unwrap();

    let report = engine.export_all_entries(&export).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.succeeded, vec!["a.txt", "b.lua", "c.xml"]);

    for name in ["a.txt", "b.lua", "c.xml"] {
        assert_eq!(
            digest_file(&export.join(name)).unwrap(),
            digest_file(&source.join(name)).unwrap()
        );
        assert_eq!(
            engine.entry_digest(name).unwrap(),
            digest(&fs::read(source.join(name)).unwrap())
        );
    }

    let entry = engine.get_entry("b.lua").unwrap();
    let single = temp.path().join("single/nested/b.lua");
    engine.export_file_entry(&single, &entry).unwrap();
    assert_eq!(fs::read(single).unwrap(), b"return 42");
}

#[test]
fn export_by_extension_uses_subdirectory() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    let export = temp.path().join("export");
    write(&source, "z.TXT", b"z");
    write(&source, "a.txt", b"a");
    write(&source, "m.bin", b"m");

    let mut engine = engine();
    engine.build(&source, &out).unwrap();

    let report = engine.export_ext_entries(&export, "txt").unwrap();
    assert_eq!(report.succeeded, vec!["a.txt", "z.TXT"]);
    assert!(export.join("txt/a.txt").is_file());
    assert!(export.join("txt/z.TXT").is_file());
    assert!(!export.join("txt/m.bin").exists());

    let sorted: Vec<_> = engine
        .get_entries_by_extension("txt", SortBy::Name)
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(sorted, vec!["a.txt", "z.TXT"]);
}

#[test]
fn export_continues_past_bad_entries() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "good.txt", b"good");

    let mut engine = engine();
    engine.build(&source, &out).unwrap();
    engine.close();

    // Rewrite the index with a second entry whose name escapes the
    // destination directory.
    let index_path = out.join(INDEX_FILE_NAME);
    let enc = TextEncoding::default();
    let mut file = IndexFile::decode(&fs::read(&index_path).unwrap(), enc).unwrap();
    file.entries.push(IndexEntry::new("../escape.txt", 0, 0, 4));
    fs::write(&index_path, file.encode(enc).unwrap()).unwrap();

    engine.load(&index_path).unwrap();
    let export = temp.path().join("export");
    let report = engine.export_all_entries(&export).unwrap();

    assert_eq!(report.succeeded, vec!["good.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "../escape.txt");
    assert!(!temp.path().join("escape.txt").exists());
}

#[test]
fn search_threshold_boundary() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    write(&source, "monster_boss.dds", b"1");
    write(&source, "monster_mob.dds", b"2");
    write(&source, "npc.dds", b"3");

    let mut engine = engine();
    engine.build(&source, &temp.path().join("out")).unwrap();

    assert_eq!(engine.get_entries_by_partial_name("bos").len(), 3);
    let hits = engine.get_entries_by_partial_name("BOSS");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "monster_boss.dds");
    assert_eq!(engine.get_entries_by_partial_name("monster").len(), 2);
}

#[test]
fn import_then_save_survives_reload() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "a.txt", b"a");

    let mut engine = engine();
    engine.build(&source, &out).unwrap();
    let added = write(temp.path(), "incoming/b.cfg", b"volume=3");
    engine.import_file_entry(&added).unwrap();
    engine.save(&out).unwrap();

    let mut reloaded = engine_with_case(CasePolicy::Insensitive);
    reloaded.load(&out.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(reloaded.row_count(), 2);
    assert_eq!(reloaded.get_file_bytes("B.CFG").unwrap(), b"volume=3");
}

fn engine_with_case(case_policy: CasePolicy) -> VaultEngine {
    VaultEngine::new(EngineConfig {
        case_policy,
        ..EngineConfig::default()
    })
    .unwrap()
}

#[test]
fn failed_rebuild_leaves_no_stale_index() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first");
    let second = temp.path().join("second");
    let out = temp.path().join("out");
    write(&first, "a.txt", b"AAAAAAAAAA");
    write(&second, "a.txt", b"BBBBBBBBBB");
    write(&second, "one/x.txt", b"x");
    write(&second, "two/x.txt", b"x");

    engine().build(&first, &out).unwrap();
    let previous = fs::read(out.join(INDEX_FILE_NAME)).unwrap();

    let err = engine().build(&second, &out).unwrap_err();
    assert!(matches!(err, Error::DuplicateName(ref name) if name == "x.txt"));

    assert!(!out.join(INDEX_FILE_NAME).exists());
    assert_eq!(fs::read(out.join(BACKUP_FILE_NAME)).unwrap(), previous);
    assert!(engine().load(&out.join(INDEX_FILE_NAME)).is_err());
}

#[test]
fn failed_rebuild_without_backup_removes_index() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first");
    let second = temp.path().join("second");
    let out = temp.path().join("out");
    write(&first, "a.txt", b"AAAAAAAAAA");
    write(&second, "one/x.txt", b"x");
    write(&second, "two/x.txt", b"x");

    let config = EngineConfig {
        backup: false,
        ..EngineConfig::default()
    };
    VaultEngine::new(config.clone()).unwrap().build(&first, &out).unwrap();
    let mut engine = VaultEngine::new(config).unwrap();
    assert!(engine.build(&second, &out).is_err());

    assert!(!out.join(INDEX_FILE_NAME).exists());
    assert!(!out.join(BACKUP_FILE_NAME).exists());
    assert!(engine.load(&out.join(INDEX_FILE_NAME)).is_err());
}

#[test]
fn load_detects_missing_container() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "a.txt", b"a");

    engine().build(&source, &out).unwrap();
    fs::remove_file(out.join("data.001")).unwrap();

    let mut engine = engine();
    let err = engine.load(&out.join(INDEX_FILE_NAME)).unwrap_err();
    assert!(matches!(err, Error::ContainerMissing { data_id: 0, .. }));
    assert_eq!(engine.state(), VaultState::Empty);
    assert_eq!(engine.open_handles(), 0);
}

#[test]
fn load_detects_truncated_container() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "a.txt", &[1u8; 50]);

    engine().build(&source, &out).unwrap();
    let container = fs::OpenOptions::new()
        .write(true)
        .open(out.join("data.001"))
        .unwrap();
    container.set_len(20).unwrap();

    let err = engine().load(&out.join(INDEX_FILE_NAME)).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { size: 20, .. }));
}

#[test]
fn load_rejects_garbage_index() {
    let temp = TempDir::new().unwrap();
    let index = write(temp.path(), INDEX_FILE_NAME, b"definitely not an index");

    let mut engine = engine();
    assert!(matches!(engine.load(&index), Err(Error::CorruptIndex(_))));
    assert_eq!(engine.state(), VaultState::Empty);
}

#[test]
fn load_warns_about_code_page_mismatch() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "plain.txt", b"ascii names decode either way");

    engine().build(&source, &out).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let config = EngineConfig {
        encoding: "euc-kr".to_string(),
        ..EngineConfig::default()
    };
    let mut engine = VaultEngine::with_observer(config, move |event: ProgressEvent| {
        sink.lock().unwrap().push(event)
    })
    .unwrap();
    engine.load(&out.join(INDEX_FILE_NAME)).unwrap();

    let warned = events.lock().unwrap().iter().any(|event| {
        matches!(event, ProgressEvent::Message(text) if text.contains("windows-1252"))
    });
    assert!(warned);
    assert_eq!(engine.row_count(), 1);
}

#[test]
fn conflicting_encryption_keeps_first_flag() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    let out = temp.path().join("out");
    write(&source, "init.lua", b"-- plain at build time");

    let plain = EngineConfig {
        encrypted_extensions: Vec::new(),
        ..EngineConfig::default()
    };
    VaultEngine::new(plain)
        .unwrap()
        .build(&source, &out)
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut engine = VaultEngine::with_observer(EngineConfig::default(), move |event: ProgressEvent| {
        sink.lock().unwrap().push(event)
    })
    .unwrap();
    engine.load(&out.join(INDEX_FILE_NAME)).unwrap();
    assert!(!engine.extension_encrypted("lua"));

    let added = write(temp.path(), "more/extra.lua", b"-- imported later");
    let entry = engine.import_file_entry(&added).unwrap();

    let warned = events.lock().unwrap().iter().any(|event| {
        matches!(event, ProgressEvent::Message(text) if text.contains("already registered"))
    });
    assert!(warned);

    // Stored in clear, matching the flag the vault was built with.
    let raw = fs::read(out.join("data.001")).unwrap();
    let start = entry.offset as usize;
    assert_eq!(&raw[start..start + entry.length as usize], b"-- imported later");
    assert_eq!(engine.get_file_bytes("extra.lua").unwrap(), b"-- imported later");
}
