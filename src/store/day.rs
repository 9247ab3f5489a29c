use chrono::NaiveDate;

use crate::model::*;

/// All blocks of one vehicle on one date, sorted by start time.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub blocks: Vec<AvailabilityBlock>,
}

impl DaySchedule {
    pub fn new(vehicle_id: VehicleId, date: NaiveDate) -> Self {
        Self {
            vehicle_id,
            date,
            blocks: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start time.
    pub fn insert(&mut self, block: AvailabilityBlock) {
        let pos = self
            .blocks
            .partition_point(|b| b.range.start <= block.range.start);
        self.blocks.insert(pos, block);
    }

    pub fn remove(&mut self, id: BlockId) -> Option<AvailabilityBlock> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    pub fn get(&self, id: BlockId) -> Option<&AvailabilityBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut AvailabilityBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Blocks whose range overlaps `query`. Binary search skips everything
    /// starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &AvailabilityBlock> {
        let right_bound = self.blocks.partition_point(|b| b.range.start < query.end);
        self.blocks[..right_bound]
            .iter()
            .filter(move |b| b.range.end > query.start)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
    }

    fn block(start: &str, end: &str) -> AvailabilityBlock {
        AvailabilityBlock {
            id: Ulid::new(),
            vehicle_id: Ulid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 6, 15).unwrap(),
            range: range(start, end),
            kind: BlockKind::Maintenance,
            brand_id: None,
            created_by: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn day() -> DaySchedule {
        DaySchedule::new(Ulid::nil(), NaiveDate::from_ymd_opt(2026, 6, 15).unwrap())
    }

    #[test]
    fn insert_keeps_start_order() {
        let mut d = day();
        d.insert(block("14:00", "15:00"));
        d.insert(block("08:00", "09:00"));
        d.insert(block("10:00", "12:00"));
        let starts: Vec<String> = d.blocks.iter().map(|b| b.range.start.to_string()).collect();
        assert_eq!(starts, ["08:00", "10:00", "14:00"]);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut d = day();
        let a = block("08:00", "09:00");
        let b = block("09:00", "10:00");
        let c = block("10:00", "11:00");
        let b_id = b.id;
        for x in [a.clone(), b, c.clone()] {
            d.insert(x);
        }
        assert!(d.remove(b_id).is_some());
        assert_eq!(d.blocks.len(), 2);
        assert_eq!(d.blocks[0].id, a.id);
        assert_eq!(d.blocks[1].id, c.id);
        assert!(d.remove(b_id).is_none());
    }

    #[test]
    fn overlapping_skips_before_and_after() {
        let mut d = day();
        d.insert(block("08:00", "09:00"));
        let hit = block("09:30", "11:30");
        let hit_id = hit.id;
        d.insert(hit);
        d.insert(block("14:00", "15:00"));

        let hits: Vec<_> = d.overlapping(&range("10:00", "12:00")).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, hit_id);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut d = day();
        d.insert(block("10:00", "14:00"));
        assert_eq!(d.overlapping(&range("14:00", "15:00")).count(), 0);
        assert_eq!(d.overlapping(&range("09:00", "10:00")).count(), 0);
        assert_eq!(d.overlapping(&range("13:59", "15:00")).count(), 1);
    }

    #[test]
    fn overlapping_wide_block_spanning_query() {
        let mut d = day();
        d.insert(block("08:00", "22:00"));
        assert_eq!(d.overlapping(&range("12:00", "13:00")).count(), 1);
        assert_eq!(day().overlapping(&range("12:00", "13:00")).count(), 0);
    }
}
