//! Duration allocation: place narrated comments on the output timeline.
//!
//! Items are accepted in order until the target length is reached. Each item
//! after the first is preceded by `pause_gap` seconds of silence. With
//! `allow_exceed` the item that crosses the target is kept and allocation
//! stops after it; without it that item and everything after it is dropped.

use postvid_models::{NarratedItem, Schedule, ScheduledItem};

/// Compute the schedule for `items`. Pure and deterministic.
pub fn allocate(
    items: &[NarratedItem],
    pause_gap: f64,
    target_duration: f64,
    allow_exceed: bool,
) -> Schedule {
    let mut schedule = Schedule::default();

    for item in items {
        let gap = if schedule.is_empty() { 0.0 } else { pause_gap };
        let candidate_total = schedule.cumulative + gap + item.duration;

        if !allow_exceed && candidate_total > target_duration {
            break;
        }

        schedule.items.push(ScheduledItem {
            comment: item.comment.clone(),
            audio: item.audio.clone(),
            start_time: schedule.cumulative + gap,
            duration: item.duration,
        });
        schedule.cumulative = candidate_total;

        if allow_exceed && schedule.cumulative >= target_duration {
            break;
        }
    }

    schedule
}

/// Whether a running narration total (gaps included) already decides the
/// schedule, so items after it can never be accepted.
pub fn is_saturated(total: f64, target_duration: f64, allow_exceed: bool) -> bool {
    if allow_exceed {
        total >= target_duration
    } else {
        total > target_duration
    }
}

/// Final output length: the end of the last scheduled item, never longer
/// than the source. An empty schedule keeps the whole source.
pub fn output_length(schedule: &Schedule, source_length: f64) -> f64 {
    match schedule.last_end_time() {
        Some(end) => end.min(source_length),
        None => source_length,
    }
}

/// Chooses the target duration for a job.
#[derive(Debug, Clone, Copy)]
pub struct TargetPolicy {
    pub default_secs: u32,
    pub max_secs: u32,
}

impl TargetPolicy {
    pub fn new(default_secs: u32, max_secs: u32) -> Self {
        Self {
            default_secs,
            max_secs,
        }
    }

    /// Requested length, or the default, capped at the maximum.
    pub fn target_for(&self, requested: Option<u32>) -> f64 {
        f64::from(requested.unwrap_or(self.default_secs).min(self.max_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postvid_models::CommentItem;

    fn narrated(durations: &[f64]) -> Vec<NarratedItem> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let comment = CommentItem {
                    speaker: format!("user{i}"),
                    text: format!("comment {i}"),
                    avatar: None,
                    is_title: false,
                };
                NarratedItem::new(comment, format!("audio-{i}.mp3"), *d)
            })
            .collect()
    }

    fn spans(schedule: &Schedule) -> Vec<(f64, f64)> {
        schedule
            .items
            .iter()
            .map(|i| (i.start_time, i.duration))
            .collect()
    }

    #[test]
    fn test_scenario_without_exceed() {
        let schedule = allocate(&narrated(&[3.0, 2.0, 4.0]), 1.0, 7.0, false);
        assert_eq!(spans(&schedule), vec![(0.0, 3.0), (4.0, 2.0)]);
        assert_eq!(schedule.cumulative, 6.0);
    }

    #[test]
    fn test_scenario_with_exceed() {
        let schedule = allocate(&narrated(&[3.0, 2.0, 4.0]), 1.0, 7.0, true);
        assert_eq!(spans(&schedule), vec![(0.0, 3.0), (4.0, 2.0), (7.0, 4.0)]);
        assert_eq!(schedule.cumulative, 11.0);
        assert_eq!(output_length(&schedule, 30.0), 11.0);
        assert_eq!(output_length(&schedule, 9.5), 9.5);
    }

    #[test]
    fn test_truncation_keeps_a_prefix_within_target() {
        let items = narrated(&[2.0, 5.0, 1.0, 1.0]);
        let schedule = allocate(&items, 0.5, 8.0, false);

        // 2 + 0.5 + 5 = 7.5, the third would make 9.0
        assert_eq!(schedule.len(), 2);
        for (scheduled, original) in schedule.items.iter().zip(&items) {
            assert_eq!(scheduled.comment, original.comment);
            assert!(scheduled.end_time() <= 8.0);
        }
    }

    #[test]
    fn test_truncation_stops_at_first_overflow() {
        // The short item after the long one must not be accepted
        let schedule = allocate(&narrated(&[2.0, 10.0, 1.0]), 1.0, 5.0, false);
        assert_eq!(spans(&schedule), vec![(0.0, 2.0)]);
    }

    #[test]
    fn test_exceed_accepts_nothing_after_target() {
        let schedule = allocate(&narrated(&[4.0, 4.0, 4.0, 4.0]), 1.0, 6.0, true);
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.cumulative, 9.0);

        let mut last = 0.0;
        for item in &schedule.items {
            assert!(item.end_time() >= last);
            last = item.end_time();
        }
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        let schedule = allocate(&narrated(&[3.0, 3.0]), 1.0, 7.0, false);
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.cumulative, 7.0);
    }

    #[test]
    fn test_first_item_longer_than_target() {
        let items = narrated(&[10.0, 1.0]);
        assert!(allocate(&items, 1.0, 5.0, false).is_empty());

        let schedule = allocate(&items, 1.0, 5.0, true);
        assert_eq!(spans(&schedule), vec![(0.0, 10.0)]);
    }

    #[test]
    fn test_empty_input() {
        let schedule = allocate(&[], 1.0, 60.0, true);
        assert!(schedule.is_empty());
        assert_eq!(schedule.cumulative, 0.0);
        assert_eq!(output_length(&schedule, 42.0), 42.0);
    }

    #[test]
    fn test_deterministic() {
        let items = narrated(&[1.5, 2.25, 3.0, 0.75]);
        assert_eq!(
            allocate(&items, 1.0, 6.0, true),
            allocate(&items, 1.0, 6.0, true)
        );
    }

    #[test]
    fn test_target_policy() {
        let policy = TargetPolicy::new(60, 180);
        assert_eq!(policy.target_for(None), 60.0);
        assert_eq!(policy.target_for(Some(90)), 90.0);
        assert_eq!(policy.target_for(Some(600)), 180.0);
    }

    #[test]
    fn test_narration_can_stop_at_saturation() {
        let items = narrated(&[3.0, 2.0, 4.0, 5.0, 1.0]);
        for allow_exceed in [true, false] {
            let mut total = 0.0;
            let mut narrated_count = items.len();
            for (i, item) in items.iter().enumerate() {
                total += if i == 0 { 0.0 } else { 1.0 } + item.duration;
                if is_saturated(total, 7.0, allow_exceed) {
                    narrated_count = i + 1;
                    break;
                }
            }

            assert_eq!(narrated_count, 3);
            assert_eq!(
                allocate(&items[..narrated_count], 1.0, 7.0, allow_exceed),
                allocate(&items, 1.0, 7.0, allow_exceed)
            );
        }
    }

    #[test]
    fn test_exact_fit_is_saturated_only_when_exceeding() {
        assert!(is_saturated(7.0, 7.0, true));
        assert!(!is_saturated(7.0, 7.0, false));
        assert!(is_saturated(7.5, 7.0, false));
        assert!(!is_saturated(6.0, 7.0, true));
    }
}
