//! Read-only view of the fleet and the booking calendar's policy tables.
//!
//! Vehicles, blackout rules and booking numbers belong to other parts of the
//! platform; the availability core only reads them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{BookingId, BrandId, VehicleId};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Maintenance,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub capacity: u32,
    pub status: VehicleStatus,
    /// Shared across every storefront.
    pub available_to_all_brands: bool,
    pub brand_ids: Vec<BrandId>,
}

impl Vehicle {
    pub fn new(id: VehicleId, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            status: VehicleStatus::Active,
            available_to_all_brands: true,
            brand_ids: Vec::new(),
        }
    }

    pub fn for_brands(mut self, brand_ids: impl IntoIterator<Item = BrandId>) -> Self {
        self.available_to_all_brands = false;
        self.brand_ids = brand_ids.into_iter().collect();
        self
    }

    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == VehicleStatus::Active
    }

    /// Brand scoping is a filter over a shared pool, not an isolation boundary.
    pub fn serves_brand(&self, brand_id: Option<BrandId>) -> bool {
        match brand_id {
            None => true,
            Some(brand) => self.available_to_all_brands || self.brand_ids.contains(&brand),
        }
    }

    /// Active, big enough, and offered to `brand_id`.
    pub fn is_candidate(&self, party_size: u32, brand_id: Option<BrandId>) -> bool {
        self.is_active() && self.capacity >= party_size && self.serves_brand(brand_id)
    }

    pub fn summary(&self) -> VehicleSummary {
        VehicleSummary {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub id: VehicleId,
    pub name: String,
    pub capacity: u32,
}

/// A date on which no tours run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutRule {
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub active: bool,
}

#[async_trait]
pub trait FleetCatalog: Send + Sync {
    /// Active vehicles seating at least `min_capacity`, offered to `brand_id`
    /// when given, smallest capacity first.
    async fn candidate_vehicles(
        &self,
        min_capacity: u32,
        brand_id: Option<BrandId>,
    ) -> Result<Vec<Vehicle>, StoreError>;

    async fn vehicles_by_id(
        &self,
        ids: &[VehicleId],
    ) -> Result<HashMap<VehicleId, Vehicle>, StoreError>;

    /// The active blackout rule for `date`, if any.
    async fn active_blackout(&self, date: NaiveDate) -> Result<Option<BlackoutRule>, StoreError>;

    async fn booking_numbers(
        &self,
        ids: &[BookingId],
    ) -> Result<HashMap<BookingId, String>, StoreError>;
}

/// In-memory catalog for tests, demos and single-process hosts.
#[derive(Default)]
pub struct StaticCatalog {
    vehicles: DashMap<VehicleId, Vehicle>,
    blackouts: DashMap<NaiveDate, BlackoutRule>,
    booking_numbers: DashMap<BookingId, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        let catalog = Self::new();
        for v in vehicles {
            catalog.upsert_vehicle(v);
        }
        catalog
    }

    pub fn upsert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn set_blackout(&self, date: NaiveDate, reason: Option<&str>) {
        self.blackouts.insert(
            date,
            BlackoutRule {
                date,
                reason: reason.map(str::to_string),
                active: true,
            },
        );
    }

    pub fn clear_blackout(&self, date: NaiveDate) {
        if let Some(mut rule) = self.blackouts.get_mut(&date) {
            rule.active = false;
        }
    }

    pub fn set_booking_number(&self, booking_id: BookingId, number: impl Into<String>) {
        self.booking_numbers.insert(booking_id, number.into());
    }
}

#[async_trait]
impl FleetCatalog for StaticCatalog {
    async fn candidate_vehicles(
        &self,
        min_capacity: u32,
        brand_id: Option<BrandId>,
    ) -> Result<Vec<Vehicle>, StoreError> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|e| e.value().is_candidate(min_capacity, brand_id))
            .map(|e| e.value().clone())
            .collect();
        vehicles.sort_by(|a, b| {
            a.capacity
                .cmp(&b.capacity)
                .then_with(|| a.name.cmp(&b.name))
                .then(a.id.cmp(&b.id))
        });
        Ok(vehicles)
    }

    async fn vehicles_by_id(
        &self,
        ids: &[VehicleId],
    ) -> Result<HashMap<VehicleId, Vehicle>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.vehicles.get(id).map(|v| (*id, v.value().clone())))
            .collect())
    }

    async fn active_blackout(&self, date: NaiveDate) -> Result<Option<BlackoutRule>, StoreError> {
        Ok(self
            .blackouts
            .get(&date)
            .filter(|rule| rule.active)
            .map(|rule| rule.value().clone()))
    }

    async fn booking_numbers(
        &self,
        ids: &[BookingId],
    ) -> Result<HashMap<BookingId, String>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.booking_numbers.get(id).map(|n| (*id, n.value().clone())))
            .collect())
    }
}
