// End-to-end scenarios exercising the public library surface: hashing,
// signature matching, heuristics, and quarantine working together through
// `DetectionPipeline::scan_directory`.

use std::fs;
use std::sync::Arc;

use sentinel_av::pipeline::{DetectionPipeline, MalwareTag, Verdict};
use sentinel_av::{QuarantineVault, ScannerConfig, SignatureStore};

fn build_pipeline(root: &std::path::Path) -> (DetectionPipeline, QuarantineVault) {
    let mut config = ScannerConfig::default();
    config.signature_db_path = root.join("signatures.db").to_string_lossy().to_string();
    let signatures = Arc::new(SignatureStore::load(&config.signature_db_path).unwrap());
    let pipeline = DetectionPipeline::new(config, signatures);
    let vault = QuarantineVault::new(root.join("quarantine"));
    (pipeline, vault)
}

#[test]
fn known_signature_is_quarantined_during_a_directory_scan() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, vault) = build_pipeline(dir.path());

    let target = dir.path().join("known_bad.exe");
    fs::write(&target, []).unwrap(); // SHA-256 of empty content is well known.
    let empty_sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    pipeline.signatures().add(empty_sha256).unwrap();

    let report = pipeline.scan_directory(dir.path(), &vault);

    assert_eq!(report.threats_found, 1);
    assert!(!target.exists());
    assert_eq!(vault.list().unwrap(), vec!["known_bad.exe.quarantine".to_string()]);
}

#[test]
fn one_megabyte_of_random_bytes_is_flagged_as_high_entropy() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _vault) = build_pipeline(dir.path());

    let target = dir.path().join("packed_payload.bin");
    let mut bytes = vec![0u8; 1024 * 1024];
    let mut state: u32 = 0xC0FF_EE11;
    for b in bytes.iter_mut() {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        *b = (state & 0xFF) as u8;
    }
    fs::write(&target, &bytes).unwrap();

    let verdict = pipeline.scan_file(&target);
    assert_eq!(verdict, Verdict::Malicious(MalwareTag::HighEntropy));
}

#[test]
fn upx_token_at_a_nonzero_offset_is_flagged_as_a_packer_signature() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _vault) = build_pipeline(dir.path());

    let target = dir.path().join("upx_packed.exe");
    let mut content = vec![0u8; 512];
    content.extend_from_slice(b"UPX!");
    content.extend_from_slice(&[0u8; 64]);
    fs::write(&target, &content).unwrap();

    assert_eq!(
        pipeline.scan_file(&target),
        Verdict::Malicious(MalwareTag::PackerSignature)
    );
}

#[test]
fn quarantining_two_files_with_the_same_basename_does_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let (_pipeline, vault) = build_pipeline(dir.path());

    let sub_a = dir.path().join("a");
    let sub_b = dir.path().join("b");
    fs::create_dir_all(&sub_a).unwrap();
    fs::create_dir_all(&sub_b).unwrap();

    let file_a = sub_a.join("malware.exe");
    let file_b = sub_b.join("malware.exe");
    fs::write(&file_a, b"first").unwrap();
    fs::write(&file_b, b"second").unwrap();

    let target_a = vault.quarantine(&file_a).unwrap();
    let target_b = vault.quarantine(&file_b).unwrap();

    assert_ne!(target_a, target_b);
    assert_eq!(fs::read(&target_a).unwrap(), b"first");
    assert_eq!(fs::read(&target_b).unwrap(), b"second");
}

#[test]
fn signature_added_in_one_session_is_visible_after_a_fresh_load() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("signatures.db");

    {
        let store = SignatureStore::load(&db_path).unwrap();
        store.add(&"a".repeat(64)).unwrap();
    }

    // Simulates a process restart: a brand new store reads the same file.
    let reloaded = SignatureStore::load(&db_path).unwrap();
    assert!(reloaded.contains(&"a".repeat(64)));
    assert_eq!(reloaded.count(), 1);
}

#[test]
fn directory_scan_reports_are_accurate_across_clean_and_malicious_files() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, vault) = build_pipeline(dir.path());

    fs::write(dir.path().join("clean_a.txt"), b"hello world").unwrap();
    fs::write(dir.path().join("clean_b.txt"), b"another clean file").unwrap();

    let bad = dir.path().join("bad.exe");
    fs::write(&bad, []).unwrap();
    let empty_sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    pipeline.signatures().add(empty_sha256).unwrap();

    let report = pipeline.scan_directory(dir.path(), &vault);

    // clean_a, clean_b, bad.exe, and the signatures.db file itself.
    assert!(report.files_scanned >= 4);
    assert_eq!(report.threats_found, 1);
}
