use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedLedger;

/// Lookup contract for the records the engine references but does not lock.
pub trait Directory {
    fn user(&self, id: &Ulid) -> Option<User>;
    fn agency(&self, id: &Ulid) -> Option<Agency>;
}

pub struct InMemoryStore {
    cars: DashMap<Ulid, SharedLedger>,
    /// Reverse lookup: rental id → car id
    rental_to_car: DashMap<Ulid, Ulid>,
    agencies: DashMap<Ulid, Agency>,
    users: DashMap<Ulid, User>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for InMemoryStore {
    fn user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    fn agency(&self, id: &Ulid) -> Option<Agency> {
        self.agencies.get(id).map(|e| e.value().clone())
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            cars: DashMap::new(),
            rental_to_car: DashMap::new(),
            agencies: DashMap::new(),
            users: DashMap::new(),
        }
    }

    // ── Cars ─────────────────────────────────────────────────

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn contains_car(&self, id: &Ulid) -> bool {
        self.cars.contains_key(id)
    }

    pub fn get_ledger(&self, id: &Ulid) -> Option<SharedLedger> {
        self.cars.get(id).map(|e| e.value().clone())
    }

    /// Handles to every ledger, sorted by car id. Collected up front so no
    /// map shard stays locked while callers await the ledgers.
    pub fn ledgers(&self) -> Vec<(Ulid, SharedLedger)> {
        let mut all: Vec<_> = self
            .cars
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    // ── Rental index ─────────────────────────────────────────

    pub fn car_for_rental(&self, rental_id: &Ulid) -> Option<Ulid> {
        self.rental_to_car.get(rental_id).map(|e| *e.value())
    }

    pub fn rental_count(&self) -> usize {
        self.rental_to_car.len()
    }

    /// Claim a rental id for `car_id`. False if any car already holds it.
    pub fn reserve_rental(&self, rental_id: Ulid, car_id: Ulid) -> bool {
        match self.rental_to_car.entry(rental_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(car_id);
                true
            }
        }
    }

    /// Undo `reserve_rental` for a creation that never reached the log.
    pub fn release_reservation(&self, event: &Event) {
        if let Event::RentalCreated { rental } = event {
            self.rental_to_car.remove(&rental.id);
        }
    }

    // ── Directory records ────────────────────────────────────

    pub fn contains_agency(&self, id: &Ulid) -> bool {
        self.agencies.contains_key(id)
    }

    pub fn contains_user(&self, id: &Ulid) -> bool {
        self.users.contains_key(id)
    }

    pub fn agencies(&self) -> Vec<Agency> {
        let mut all: Vec<_> = self.agencies.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }

    pub fn users(&self) -> Vec<User> {
        let mut all: Vec<_> = self.users.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|u| u.id);
        all
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event that creates a record outside any ledger.
    /// Returns false for ledger-scoped events, which go through `apply_to_ledger`.
    pub fn apply_registration(&self, event: &Event) -> bool {
        match event {
            Event::AgencyRegistered { id, name } => {
                self.agencies.insert(*id, Agency { id: *id, name: name.clone() });
            }
            Event::UserRegistered { id, name } => {
                self.users.insert(*id, User { id: *id, name: name.clone() });
            }
            Event::CarRegistered { car } => {
                let ledger = CarLedger::new(car.clone());
                self.cars.insert(car.id, Arc::new(RwLock::new(ledger)));
            }
            _ => return false,
        }
        true
    }

    /// Apply a car-scoped event to its ledger (no locking, caller holds the write lock).
    /// Car and rental effects land together.
    pub fn apply_to_ledger(&self, ledger: &mut CarLedger, event: &Event) {
        match event {
            Event::CarUpdated { car } => {
                ledger.car = car.clone();
            }
            Event::CarRemoved { id } => {
                for rental in ledger.rentals.drain(..) {
                    self.rental_to_car.remove(&rental.id);
                }
                ledger.retired = true;
                self.cars.remove(id);
            }
            Event::RentalCreated { rental } => {
                self.rental_to_car.insert(rental.id, rental.car_id);
                ledger.insert_rental(rental.clone());
            }
            Event::RentalConfirmed { id, at, .. } => {
                if let Some(r) = ledger.rental_mut(*id) {
                    r.status = RentalStatus::Confirmed;
                    r.updated_at = *at;
                }
            }
            Event::RentalCheckedIn { id, at, .. } => {
                if let Some(r) = ledger.rental_mut(*id) {
                    r.status = RentalStatus::Active;
                    r.updated_at = *at;
                    ledger.car.status = CarStatus::Rented;
                }
            }
            Event::RentalFinalized {
                id,
                end_mileage,
                real_return_date,
                total_value,
                at,
                ..
            } => {
                if let Some(r) = ledger.rental_mut(*id) {
                    r.status = RentalStatus::Completed;
                    r.end_mileage = Some(*end_mileage);
                    r.real_return_date = Some(*real_return_date);
                    r.total_value = *total_value;
                    r.updated_at = *at;
                    let return_agency = r.return_agency_id;
                    ledger.car.current_mileage = *end_mileage;
                    ledger.car.agency_id = return_agency;
                    ledger.car.status = CarStatus::Available;
                }
            }
            Event::RentalCancelled { id, at, .. } => {
                if let Some(r) = ledger.rental_mut(*id) {
                    r.status = RentalStatus::Cancelled;
                    r.updated_at = *at;
                }
            }
            Event::RentalRevised {
                id,
                span,
                return_agency_id,
                start_mileage,
                total_value,
                at,
                ..
            } => {
                // Re-insert so the ledger stays sorted by start.
                if let Some(mut r) = ledger.remove_rental(*id) {
                    r.span = *span;
                    r.return_agency_id = *return_agency_id;
                    r.start_mileage = *start_mileage;
                    r.total_value = *total_value;
                    r.updated_at = *at;
                    ledger.insert_rental(r);
                }
            }
            Event::RentalRemoved { id, .. } => {
                ledger.remove_rental(*id);
                self.rental_to_car.remove(id);
            }
            Event::AgencyRegistered { .. }
            | Event::UserRegistered { .. }
            | Event::CarRegistered { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{car, rental};
    use rust_decimal::Decimal;

    fn store_with_car() -> (InMemoryStore, Ulid) {
        let store = InMemoryStore::new();
        let c = car(Decimal::new(90, 0), 1000);
        let id = c.id;
        assert!(store.apply_registration(&Event::CarRegistered { car: c }));
        (store, id)
    }

    #[test]
    fn directory_lookups() {
        let store = InMemoryStore::new();
        let agency = Ulid::new();
        let user = Ulid::new();
        store.apply_registration(&Event::AgencyRegistered { id: agency, name: "Downtown".into() });
        store.apply_registration(&Event::UserRegistered { id: user, name: "Ada".into() });

        let dir: &dyn Directory = &store;
        assert_eq!(dir.agency(&agency).map(|a| a.name), Some("Downtown".to_string()));
        assert_eq!(dir.user(&user).map(|u| u.name), Some("Ada".to_string()));
        assert!(dir.agency(&user).is_none());
    }

    #[test]
    fn ledger_events_are_not_registrations() {
        let store = InMemoryStore::new();
        assert!(!store.apply_registration(&Event::RentalRemoved {
            id: Ulid::new(),
            car_id: Ulid::new(),
        }));
    }

    #[test]
    fn finalize_moves_car_and_rental_together() {
        let (store, car_id) = store_with_car();
        let shared = store.get_ledger(&car_id).unwrap();
        let mut ledger = shared.try_write().unwrap();

        let mut r = rental(car_id, 0, 100, RentalStatus::Confirmed);
        let return_agency = Ulid::new();
        r.return_agency_id = return_agency;
        let rid = r.id;
        store.apply_to_ledger(&mut ledger, &Event::RentalCreated { rental: r });
        assert_eq!(store.car_for_rental(&rid), Some(car_id));

        store.apply_to_ledger(&mut ledger, &Event::RentalCheckedIn { id: rid, car_id, at: 10 });
        assert_eq!(ledger.car.status, CarStatus::Rented);

        store.apply_to_ledger(
            &mut ledger,
            &Event::RentalFinalized {
                id: rid,
                car_id,
                end_mileage: 1500,
                real_return_date: 120,
                total_value: Decimal::new(200, 0),
                at: 120,
            },
        );
        let done = ledger.rental(rid).unwrap();
        assert_eq!(done.status, RentalStatus::Completed);
        assert_eq!(done.end_mileage, Some(1500));
        assert_eq!(ledger.car.status, CarStatus::Available);
        assert_eq!(ledger.car.current_mileage, 1500);
        assert_eq!(ledger.car.agency_id, return_agency);
    }

    #[test]
    fn revise_keeps_ledger_sorted() {
        let (store, car_id) = store_with_car();
        let shared = store.get_ledger(&car_id).unwrap();
        let mut ledger = shared.try_write().unwrap();
        let a = rental(car_id, 100, 200, RentalStatus::Confirmed);
        let b = rental(car_id, 300, 400, RentalStatus::Confirmed);
        let aid = a.id;
        store.apply_to_ledger(&mut ledger, &Event::RentalCreated { rental: a });
        store.apply_to_ledger(&mut ledger, &Event::RentalCreated { rental: b });

        let agency = ledger.rental(aid).unwrap().return_agency_id;
        store.apply_to_ledger(
            &mut ledger,
            &Event::RentalRevised {
                id: aid,
                car_id,
                span: Span::new(500, 600),
                return_agency_id: agency,
                start_mileage: 0,
                total_value: Decimal::new(100, 0),
                at: 1,
            },
        );
        assert_eq!(ledger.rentals[1].id, aid);
        assert_eq!(ledger.rentals[1].span, Span::new(500, 600));
    }

    #[test]
    fn rental_ids_are_reserved_once() {
        let (store, car_id) = store_with_car();
        let rid = Ulid::new();
        assert!(store.reserve_rental(rid, car_id));
        assert!(!store.reserve_rental(rid, Ulid::new()));
        assert_eq!(store.car_for_rental(&rid), Some(car_id));

        let mut r = rental(car_id, 0, 100, RentalStatus::Confirmed);
        r.id = rid;
        store.release_reservation(&Event::RentalCreated { rental: r });
        assert!(store.car_for_rental(&rid).is_none());
        assert!(store.reserve_rental(rid, car_id));
    }

    #[test]
    fn car_removal_retires_ledger() {
        let (store, car_id) = store_with_car();
        let shared = store.get_ledger(&car_id).unwrap();
        let mut ledger = shared.try_write().unwrap();
        let r = rental(car_id, 0, 100, RentalStatus::Completed);
        let rid = r.id;
        store.apply_to_ledger(&mut ledger, &Event::RentalCreated { rental: r });

        store.apply_to_ledger(&mut ledger, &Event::CarRemoved { id: car_id });
        assert!(ledger.retired);
        assert!(!store.contains_car(&car_id));
        assert!(store.car_for_rental(&rid).is_none());
        assert_eq!(store.rental_count(), 0);
    }
}
