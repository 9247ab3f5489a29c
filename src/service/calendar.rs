use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::AvailabilityError;
use crate::limits::MAX_RANGE_DAYS;
use crate::model::*;

use super::*;

impl AvailabilityService {
    pub async fn get_vehicle_blocks(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
    ) -> Result<Vec<BlockView>, AvailabilityError> {
        let blocks = self.store.vehicle_day_blocks(vehicle_id, date).await?;
        self.to_views(blocks, false).await
    }

    /// Every block on `date` across the fleet, with booking numbers.
    pub async fn get_day_blocks(&self, date: NaiveDate) -> Result<Vec<BlockView>, AvailabilityError> {
        let blocks = self.store.day_blocks(date).await?;
        self.to_views(blocks, true).await
    }

    /// Blocks dated `start..=end`, optionally for one vehicle.
    pub async fn get_blocks_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        vehicle_id: Option<VehicleId>,
    ) -> Result<Vec<BlockView>, AvailabilityError> {
        if end < start {
            return Err(AvailabilityError::Validation(format!(
                "Range end {end} is before start {start}"
            )));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(AvailabilityError::Validation(format!(
                "Date range may span at most {MAX_RANGE_DAYS} days"
            )));
        }
        let blocks = self.store.blocks_between(start, end, vehicle_id).await?;
        self.to_views(blocks, false).await
    }

    /// Attach vehicle names (and booking numbers if asked), then order by
    /// date, vehicle name, start time.
    async fn to_views(
        &self,
        blocks: Vec<AvailabilityBlock>,
        with_booking_numbers: bool,
    ) -> Result<Vec<BlockView>, AvailabilityError> {
        let mut vehicle_ids: Vec<VehicleId> = blocks.iter().map(|b| b.vehicle_id).collect();
        vehicle_ids.sort_unstable();
        vehicle_ids.dedup();
        let vehicles = self.catalog.vehicles_by_id(&vehicle_ids).await?;

        let booking_numbers = if with_booking_numbers {
            let mut ids: Vec<BookingId> = blocks.iter().filter_map(|b| b.booking_id()).collect();
            ids.sort_unstable();
            ids.dedup();
            self.catalog.booking_numbers(&ids).await?
        } else {
            HashMap::new()
        };

        let mut views: Vec<BlockView> = blocks
            .into_iter()
            .map(|block| BlockView {
                vehicle_name: vehicles.get(&block.vehicle_id).map(|v| v.name.clone()),
                booking_number: block
                    .booking_id()
                    .and_then(|id| booking_numbers.get(&id).cloned()),
                block,
            })
            .collect();
        views.sort_by(|a, b| {
            a.block
                .date
                .cmp(&b.block.date)
                .then_with(|| a.vehicle_name.cmp(&b.vehicle_name))
                .then(a.block.range.start.cmp(&b.block.range.start))
        });
        Ok(views)
    }
}
