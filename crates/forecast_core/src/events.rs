//! Special events (concerts, sports, festivals) with spatial and temporal
//! extent. Events lift demand in nearby cells while their window overlaps a
//! prediction's target time.

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default spatial reach of an event in kilometres.
pub const DEFAULT_IMPACT_RADIUS_KM: f64 = 5.0;

/// Kind of special event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Concert,
    Sports,
    Festival,
    Conference,
    Parade,
    Other,
}

/// Trivial event lifecycle: scheduled until start, active inside the window,
/// expired afterwards (records are retained for accuracy analysis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Scheduled,
    Active,
    Expired,
}

/// Demand multiplier for an attendee count. Pure: the same count always
/// yields the same multiplier.
pub fn attendee_multiplier(expected_attendees: u32) -> f64 {
    match expected_attendees {
        a if a > 50_000 => 3.0,
        a if a > 20_000 => 2.5,
        a if a > 10_000 => 2.0,
        a if a > 5_000 => 1.5,
        a if a > 1_000 => 1.3,
        _ => 1.1,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialEvent {
    pub id: Uuid,
    pub name: String,
    pub kind: EventKind,
    pub lat: f64,
    pub lng: f64,
    pub cell: CellIndex,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub expected_attendees: u32,
    pub impact_radius_km: f64,
    pub demand_multiplier: f64,
    pub recurring: bool,
    pub created_at: DateTime<Utc>,
}

impl SpecialEvent {
    /// Build an event; the demand multiplier is derived from the attendee
    /// count and never stored independently of it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        kind: EventKind,
        lat: f64,
        lng: f64,
        cell: CellIndex,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        expected_attendees: u32,
        impact_radius_km: Option<f64>,
        recurring: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            lat,
            lng,
            cell,
            start_time,
            end_time,
            expected_attendees,
            impact_radius_km: impact_radius_km.unwrap_or(DEFAULT_IMPACT_RADIUS_KM),
            demand_multiplier: attendee_multiplier(expected_attendees),
            recurring,
            created_at: now,
        }
    }

    /// Whether the event window intersects `[from, to]`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start_time <= to && self.end_time >= from
    }

    pub fn phase(&self, now: DateTime<Utc>) -> EventPhase {
        if now < self.start_time {
            EventPhase::Scheduled
        } else if now <= self.end_time {
            EventPhase::Active
        } else {
            EventPhase::Expired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(start_h: i64, end_h: i64) -> SpecialEvent {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("valid");
        SpecialEvent::new(
            "stadium show".into(),
            EventKind::Concert,
            37.7786,
            -122.3893,
            CellIndex::try_from(0x8a1fb46622dffff).expect("valid cell"),
            now + Duration::hours(start_h),
            now + Duration::hours(end_h),
            25_000,
            None,
            false,
            now,
        )
    }

    #[test]
    fn multiplier_is_monotone_in_attendance() {
        let counts = [0, 1_001, 5_001, 10_001, 20_001, 50_001];
        let mut last = 0.0;
        for count in counts {
            let m = attendee_multiplier(count);
            assert!(m > last, "multiplier should grow with attendance");
            last = m;
        }
        assert_eq!(attendee_multiplier(25_000), 2.5);
        assert_eq!(attendee_multiplier(500), 1.1);
    }

    #[test]
    fn multiplier_is_pure() {
        assert_eq!(attendee_multiplier(17_000), attendee_multiplier(17_000));
    }

    #[test]
    fn new_event_derives_multiplier_and_radius() {
        let ev = event(1, 4);
        assert_eq!(ev.demand_multiplier, 2.5);
        assert_eq!(ev.impact_radius_km, DEFAULT_IMPACT_RADIUS_KM);
    }

    #[test]
    fn overlap_checks_window_intersection() {
        let ev = event(1, 4);
        let now = ev.created_at;
        assert!(ev.overlaps(now + Duration::hours(2), now + Duration::hours(3)));
        assert!(ev.overlaps(now, now + Duration::hours(1)));
        assert!(ev.overlaps(now + Duration::hours(4), now + Duration::hours(6)));
        assert!(!ev.overlaps(now + Duration::hours(5), now + Duration::hours(6)));
        assert!(!ev.overlaps(now - Duration::hours(2), now - Duration::hours(1)));
    }

    #[test]
    fn phase_follows_the_window() {
        let ev = event(1, 4);
        let now = ev.created_at;
        assert_eq!(ev.phase(now), EventPhase::Scheduled);
        assert_eq!(ev.phase(now + Duration::hours(2)), EventPhase::Active);
        assert_eq!(ev.phase(now + Duration::hours(5)), EventPhase::Expired);
    }
}
