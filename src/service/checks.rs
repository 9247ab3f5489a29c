use std::time::Instant;

use chrono::NaiveDate;

use crate::catalog::VehicleSummary;
use crate::error::AvailabilityError;
use crate::model::*;
use crate::observability;

use super::*;

impl AvailabilityService {
    /// Blocks on `vehicle_id` overlapping `range`, expired holds excluded.
    pub async fn check_vehicle_availability(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        range: TimeRange,
    ) -> Result<VehicleAvailability, AvailabilityError> {
        let conflicts = self
            .store
            .find_overlapping(vehicle_id, date, range, self.hold_cutoff())
            .await?;
        Ok(VehicleAvailability::from_conflicts(conflicts))
    }

    /// Free vehicles that seat the party, smallest first.
    pub async fn find_available_vehicles(
        &self,
        search: &VehicleSearch,
    ) -> Result<Vec<VehicleWithAvailability>, AvailabilityError> {
        validate_party_size(search.party_size)?;
        let (free, _busy) = self.scan_candidates(search).await?;
        Ok(free)
    }

    /// One pass over the candidates: the free ones in order, plus how many
    /// were big enough but busy.
    async fn scan_candidates(
        &self,
        search: &VehicleSearch,
    ) -> Result<(Vec<VehicleWithAvailability>, usize), AvailabilityError> {
        let candidates = self
            .catalog
            .candidate_vehicles(search.party_size, search.brand_id)
            .await?;
        let mut free = Vec::with_capacity(candidates.len());
        let mut busy = 0;
        for vehicle in candidates {
            let availability = self
                .check_vehicle_availability(vehicle.id, search.date, search.range)
                .await?;
            if availability.available {
                free.push(VehicleWithAvailability { vehicle, availability });
            } else {
                busy += 1;
            }
        }
        Ok((free, busy))
    }

    /// Whether the party can be seated for this window, and on what.
    ///
    /// Gates run cheapest first: operating hours, past date, blackout, then
    /// the per-vehicle scan. A sweep of expired holds is kicked off in the
    /// background first and never affects the answer's success.
    pub async fn check_availability(
        &self,
        request: &AvailabilityRequest,
    ) -> Result<AvailabilityCheckResult, AvailabilityError> {
        let minutes = duration_minutes(request.duration_hours)?;
        validate_party_size(request.party_size)?;
        self.spawn_cleanup();

        let started = Instant::now();
        let result = self.evaluate(request, minutes).await?;
        metrics::histogram!(observability::AVAILABILITY_CHECK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            observability::AVAILABILITY_CHECKS_TOTAL,
            "outcome" => observability::outcome_label(result.reason.as_ref())
        )
        .increment(1);
        Ok(result)
    }

    async fn evaluate(
        &self,
        request: &AvailabilityRequest,
        minutes: u32,
    ) -> Result<AvailabilityCheckResult, AvailabilityError> {
        let start = request.start_time;
        let end = start.checked_add_minutes(minutes);

        let window = end
            .and_then(|end| TimeRange::new(start, end))
            .filter(|w| self.operating_hours.contains_range(w));
        let Some(window) = window else {
            return Ok(AvailabilityCheckResult::unavailable(
                UnavailableReason::OutsideOperatingHours {
                    opening: self.operating_hours.start,
                    closing: self.operating_hours.end,
                },
                start,
                end,
            ));
        };
        let end = Some(window.end);

        if request.date < self.policy.today(self.clock.now()) {
            return Ok(AvailabilityCheckResult::unavailable(
                UnavailableReason::PastDate,
                start,
                end,
            ));
        }

        if let Some(rule) = self.catalog.active_blackout(request.date).await? {
            return Ok(AvailabilityCheckResult::unavailable(
                UnavailableReason::Blackout { reason: rule.reason },
                start,
                end,
            ));
        }

        let search = VehicleSearch {
            date: request.date,
            range: window,
            party_size: request.party_size,
            brand_id: request.brand_id,
        };
        let (free, busy) = self.scan_candidates(&search).await?;
        if free.is_empty() {
            let reason = if busy > 0 {
                UnavailableReason::AllBooked
            } else {
                UnavailableReason::NoCapacity {
                    party_size: request.party_size,
                }
            };
            return Ok(AvailabilityCheckResult::unavailable(reason, start, end));
        }

        let alternatives: Vec<VehicleSummary> = free.iter().map(|f| f.vehicle.summary()).collect();
        Ok(AvailabilityCheckResult {
            available: true,
            vehicle: alternatives.first().cloned(),
            alternatives,
            reason: None,
            start_time: start,
            end_time: end,
        })
    }

    /// Start times every slot interval from opening until the tour would no
    /// longer finish by closing, each with its own availability answer.
    pub async fn get_available_slots(
        &self,
        query: &SlotQuery,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let minutes = duration_minutes(query.duration_hours)?;
        validate_party_size(query.party_size)?;
        self.spawn_cleanup();

        let interval = self.policy.slot_interval_minutes;
        let closing = self.operating_hours.end;
        let mut slots = Vec::new();
        let mut start = Some(self.operating_hours.start);
        while let Some(slot_start) = start {
            let Some(slot_end) = slot_start.checked_add_minutes(minutes) else {
                break;
            };
            if slot_end > closing {
                break;
            }
            let request = AvailabilityRequest {
                date: query.date,
                start_time: slot_start,
                duration_hours: query.duration_hours,
                party_size: query.party_size,
                brand_id: query.brand_id,
            };
            let result = self.evaluate(&request, minutes).await?;
            slots.push(TimeSlot {
                start_time: slot_start,
                end_time: slot_end,
                available: result.available,
                vehicle: result.vehicle,
                reason: result.reason,
            });
            start = slot_start.checked_add_minutes(interval);
        }
        tracing::debug!(
            date = %query.date,
            slots = slots.len(),
            "computed slot calendar"
        );
        Ok(slots)
    }
}
