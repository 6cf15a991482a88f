use autocommit_daemon::git::message::{
    categorize, dominant_category, generate, truncate_message, MessageSettings,
};
use autocommit_daemon::git::plan::ChangeType;
use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

fn at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 31).unwrap().and_hms_opt(23, 59, 58).unwrap()
}

fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Added),
        Just(ChangeType::Modified),
        Just(ChangeType::Deleted),
        Just(ChangeType::Renamed),
        Just(ChangeType::Mixed),
    ]
}

/// Repo-relative paths, including multi-byte names.
fn file_name() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z_]{1,6}", 0..3),
        "[a-zA-Z0-9_éß日本]{1,12}",
        prop_oneof![Just("rs"), Just("md"), Just("toml"), Just("css"), Just("csv"), Just("")],
    )
        .prop_map(|(dirs, stem, ext)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&stem);
            if !ext.is_empty() {
                path.push('.');
                path.push_str(ext);
            }
            path
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn generated_message_respects_length_cap(
        kind in change_type(),
        files in prop::collection::vec(file_name(), 1..12),
        include_timestamp in any::<bool>(),
        max_length in 10usize..200,
    ) {
        let settings = MessageSettings { include_timestamp, max_length };
        let message = generate(kind, &files, &settings, at());

        let length = message.chars().count();
        prop_assert!(length <= max_length, "{} > {}: {}", length, max_length, message);
        prop_assert!(message.starts_with(kind.prefix()));
    }

    #[test]
    fn untruncated_message_names_count_and_category(
        kind in change_type(),
        files in prop::collection::vec(file_name(), 1..12),
    ) {
        let settings = MessageSettings { include_timestamp: false, max_length: 10_000 };
        let message = generate(kind, &files, &settings, at());

        let noun = if files.len() == 1 { "file" } else { "files" };
        let label = dominant_category(&files).label();
        let head = format!("{} {} {} [{}]", kind.prefix(), files.len(), noun, label);

        prop_assert!(message.starts_with(&head), "{message}");
        prop_assert!(message.contains(files[0].as_str()));
    }

    #[test]
    fn dominant_category_is_one_of_the_inputs(files in prop::collection::vec(file_name(), 1..20)) {
        let dominant = dominant_category(&files);
        prop_assert!(files.iter().any(|file| categorize(file) == dominant));
    }

    #[test]
    fn truncation_is_idempotent_and_bounded(text in "\\PC{0,300}", max in 0usize..120) {
        let once = truncate_message(&text, max);
        prop_assert!(once.chars().count() <= max);
        prop_assert_eq!(truncate_message(&once, max), once.clone());
        if text.chars().count() <= max {
            prop_assert_eq!(once, text);
        }
    }
}
