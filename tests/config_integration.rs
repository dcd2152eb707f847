use wrapmark::buffer::Invalidation;
use wrapmark::config::{ConfigFlags, load_config_flags, parse_flag_tokens};

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".wrapmarkrc");
    let content = r"
# comment
--json

--invalidate touch

--soft-wrap-column=24
";
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.json);
    assert_eq!(flags.invalidate, Some(Invalidation::Touch));
    assert_eq!(flags.soft_wrap_column, Some(24));
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".wrapmarkrc");
    let content = "--json\n--invalidate touch\n--soft-wrap-column 24\n";
    std::fs::write(&path, content).unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "wrapmark".to_string(),
        "--invalidate".to_string(),
        "never".to_string(),
        "--exclusive".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.json, "file flags should remain enabled");
    assert!(effective.exclusive, "cli flags should be applied");
    assert_eq!(
        effective.invalidate,
        Some(Invalidation::Never),
        "cli should override invalidation"
    );
    assert_eq!(
        effective.effective_soft_wrap_column(),
        Some(24),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_parse_flag_tokens_handles_equals_syntax() {
    let args = vec![
        "wrapmark".to_string(),
        "--invalidate=surround".to_string(),
        "--soft-wrap-column=12".to_string(),
    ];
    let flags = parse_flag_tokens(&args);
    assert_eq!(flags.invalidate, Some(Invalidation::Surround));
    assert_eq!(flags.soft_wrap_column, Some(12));
}

#[test]
fn test_config_union_merges_booleans() {
    let file = ConfigFlags {
        json: true,
        no_soft_wrap: true,
        ..ConfigFlags::default()
    };
    let cli = ConfigFlags {
        exclusive: true,
        soft_wrap_column: Some(30),
        ..ConfigFlags::default()
    };
    let merged = file.union(&cli);
    assert!(merged.json);
    assert!(merged.no_soft_wrap);
    assert!(merged.exclusive);
    assert_eq!(merged.effective_soft_wrap_column(), None);
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let flags = load_config_flags(&dir.path().join("absent")).unwrap();
    assert_eq!(flags, ConfigFlags::default());
}
