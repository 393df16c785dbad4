use std::time::Duration;

use crate::io::XcTaskFileType;

use super::{nice_bool, nice_save_target, stage_banner, stage_delimiter, Stage, XCTASK_BANNER_LENGTH};

#[test]
fn test_format_stage_banner() {
    for stage in [Stage::GridPartitioning, Stage::ExchangeIntegration] {
        let banner = stage_banner(stage);
        assert!(banner
            .iter()
            .all(|line| line.chars().count() == XCTASK_BANNER_LENGTH));
        assert!(banner[1].contains(stage.title()));
        assert!(banner[0].starts_with('┌') && banner[2].ends_with('┘'));
    }
    assert_eq!(Stage::GridPartitioning.title(), "Grid Partitioning");
    assert_eq!(Stage::ExchangeIntegration.to_string(), "Exchange integration");
}

#[test]
fn test_format_stage_delimiters() {
    let begin = stage_delimiter(Stage::GridPartitioning, None);
    assert!(begin.starts_with("❬❬❬❬❬ [Begin] Grid partitioning ❬"));
    assert_eq!(begin.chars().count(), XCTASK_BANNER_LENGTH);

    let end = stage_delimiter(
        Stage::ExchangeIntegration,
        Some(Duration::from_millis(1500)),
    );
    assert!(end.starts_with("❭❭❭❭❭ [ End ] Exchange integration (1.500 s) ❭"));
    assert_eq!(end.chars().count(), XCTASK_BANNER_LENGTH);
}

#[test]
fn test_format_values() {
    assert_eq!(nice_bool(true), "yes");
    assert_eq!(nice_bool(false), "no");
    assert_eq!(
        nice_save_target(Some(&"run".to_string()), XcTaskFileType::Tsk),
        "run.xctask.tsk"
    );
    assert_eq!(
        nice_save_target(Some(&"water".to_string()), XcTaskFileType::Int),
        "water.xctask.int"
    );
    assert_eq!(nice_save_target(None, XcTaskFileType::Mat), "no");
}
