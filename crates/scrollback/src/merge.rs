//! Merge of persisted history with in-flight streaming entries.

use crate::message::{Message, StreamingMessageSet};
use crate::pagination::LoadWindowState;

/// Combines `history` and `streaming` into one timestamp-ordered sequence.
///
/// Entries without a timestamp keep the exact slot they occupy in
/// `history ++ streaming`; dated entries are stably sorted through the remaining
/// slots. The output always has `history.len() + streaming.len()` entries.
pub fn merge(history: &[Message], streaming: &StreamingMessageSet) -> Vec<Message> {
    let combined = history
        .iter()
        .chain(streaming.values())
        .cloned()
        .collect::<Vec<_>>();
    order_by_timestamp(combined)
}

fn order_by_timestamp(messages: Vec<Message>) -> Vec<Message> {
    let dated_slots = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.timestamp.is_some())
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    let mut sorted_sources = dated_slots.clone();
    // `sort_by_key` is stable, so equal timestamps keep their input order.
    sorted_sources.sort_by_key(|index| messages[*index].timestamp);

    let mut sources = messages.into_iter().map(Some).collect::<Vec<_>>();
    let mut ordered = (0..sources.len()).map(|_| None).collect::<Vec<Option<Message>>>();

    for (slot, source) in dated_slots.iter().zip(sorted_sources) {
        ordered[*slot] = sources[source].take();
    }
    for (slot, entry) in ordered.iter_mut().enumerate() {
        if entry.is_none() {
            *entry = sources[slot].take();
        }
    }

    ordered.into_iter().flatten().collect()
}

/// Decides whether a newly arrived message should pull the viewport to the bottom.
///
/// Any load cycle in flight wins over both inputs so history paging never gets
/// hijacked by live traffic.
pub fn should_scroll_to_bottom(is_mine: bool, near_bottom: bool, state: &LoadWindowState) -> bool {
    if state.suppresses_follow() {
        return false;
    }
    is_mine || near_bottom
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::corrector::AnchorSnapshot;
    use crate::ids::MessageId;
    use crate::message::MessageKind;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn message(label: &str, seconds: Option<i64>) -> Message {
        let mut message = Message::new(MessageId::new_v7(), MessageKind::User, label);
        message.timestamp = seconds.map(at);
        message
    }

    fn labels(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|message| message.content.as_str()).collect()
    }

    #[test]
    fn streaming_entries_interleave_by_timestamp() {
        let history = vec![message("h1", Some(0)), message("h2", Some(20))];
        let streaming: StreamingMessageSet = [message("s1", Some(10)), message("s2", Some(30))]
            .into_iter()
            .collect();

        let merged = merge(&history, &streaming);

        assert_eq!(labels(&merged), vec!["h1", "s1", "h2", "s2"]);
        assert!(merged[1].is_streaming);
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let history = vec![message("a", Some(5)), message("b", Some(5)), message("c", Some(1))];

        let merged = merge(&history, &StreamingMessageSet::new());

        assert_eq!(labels(&merged), vec!["c", "a", "b"]);
    }

    #[test]
    fn undated_entries_hold_their_slot() {
        let history = vec![
            message("late", Some(50)),
            message("undated", None),
            message("early", Some(10)),
        ];
        let streaming: StreamingMessageSet = [message("stream-undated", None)].into_iter().collect();

        let merged = merge(&history, &streaming);

        assert_eq!(labels(&merged), vec!["early", "undated", "late", "stream-undated"]);
    }

    #[test]
    fn in_flight_load_suppresses_bottom_follow() {
        let anchor = AnchorSnapshot {
            height_before: 1_000.0,
            offset_before: 10.0,
        };

        assert!(should_scroll_to_bottom(true, false, &LoadWindowState::Idle));
        assert!(should_scroll_to_bottom(false, true, &LoadWindowState::Idle));
        assert!(!should_scroll_to_bottom(false, false, &LoadWindowState::Idle));

        for state in [
            LoadWindowState::Loading(anchor),
            LoadWindowState::Restoring(anchor),
        ] {
            for (is_mine, near_bottom) in [(true, true), (true, false), (false, true)] {
                assert!(!should_scroll_to_bottom(is_mine, near_bottom, &state));
            }
        }
    }

    proptest! {
        #[test]
        fn merge_is_ordered_stable_and_complete(
            history in prop::collection::vec(prop::option::weighted(0.8, 0i64..50), 0..40),
            streaming in prop::collection::vec(prop::option::weighted(0.8, 0i64..50), 0..10),
        ) {
            let history = history
                .iter()
                .enumerate()
                .map(|(index, seconds)| message(&format!("h{index}"), *seconds))
                .collect::<Vec<_>>();
            let streaming_set = streaming
                .iter()
                .enumerate()
                .map(|(index, seconds)| message(&format!("s{index}"), *seconds))
                .collect::<StreamingMessageSet>();

            let input = history
                .iter()
                .chain(streaming_set.values())
                .cloned()
                .collect::<Vec<_>>();
            let merged = merge(&history, &streaming_set);

            prop_assert_eq!(merged.len(), history.len() + streaming_set.len());

            let dated = merged
                .iter()
                .filter_map(|message| message.timestamp.map(|ts| (ts, message.id)))
                .collect::<Vec<_>>();
            for pair in dated.windows(2) {
                prop_assert!(pair[0].0 <= pair[1].0);
                if pair[0].0 == pair[1].0 {
                    let first = input.iter().position(|message| message.id == pair[0].1);
                    let second = input.iter().position(|message| message.id == pair[1].1);
                    prop_assert!(first < second);
                }
            }

            for (slot, original) in input.iter().enumerate() {
                if original.timestamp.is_none() {
                    prop_assert_eq!(merged[slot].id, original.id);
                }
            }
        }
    }
}
