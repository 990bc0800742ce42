use rust_decimal::Decimal;
use tokio::sync::{oneshot, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{RENTALS_TOTAL, TRANSITIONS_TOTAL};

use super::conflict::{check_no_conflict, check_not_past, now_ms, validate_window};
use super::lifecycle::{self, Transition};
use super::{pricing, Directory, Engine, EngineError, Entity, WalCommand};

fn resolve_user<D: Directory + ?Sized>(dir: &D, id: Ulid) -> Result<User, EngineError> {
    dir.user(&id).ok_or(EngineError::NotFound(Entity::User, id))
}

fn resolve_agency<D: Directory + ?Sized>(dir: &D, id: Ulid) -> Result<Agency, EngineError> {
    dir.agency(&id).ok_or(EngineError::NotFound(Entity::Agency, id))
}

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::validation("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn check_mileage(mileage: u64) -> Result<(), EngineError> {
    if mileage > MAX_MILEAGE {
        return Err(EngineError::LimitExceeded("mileage out of range"));
    }
    Ok(())
}

fn check_rate(rate: Decimal) -> Result<(), EngineError> {
    if rate <= Decimal::ZERO {
        return Err(EngineError::validation("daily_rate must be positive"));
    }
    if rate > Decimal::from(MAX_DAILY_RATE) {
        return Err(EngineError::LimitExceeded("daily_rate too large"));
    }
    Ok(())
}

impl Engine {
    // ── Directory records ────────────────────────────────────

    pub async fn register_agency(&self, id: Ulid, name: String) -> Result<Agency, EngineError> {
        check_name(&name)?;
        let registry = self.registry_lock.clone().lock_owned().await;
        if self.store.contains_agency(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::AgencyRegistered { id, name: name.clone() };
        self.persist_registration(registry, event).await?;
        tracing::info!(agency_id = %id, "agency registered");
        Ok(Agency { id, name })
    }

    pub async fn register_user(&self, id: Ulid, name: String) -> Result<User, EngineError> {
        check_name(&name)?;
        let registry = self.registry_lock.clone().lock_owned().await;
        if self.store.contains_user(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::UserRegistered { id, name: name.clone() };
        self.persist_registration(registry, event).await?;
        tracing::info!(user_id = %id, "user registered");
        Ok(User { id, name })
    }

    // ── Fleet ────────────────────────────────────────────────

    pub async fn register_car(
        &self,
        id: Ulid,
        agency_id: Ulid,
        daily_rate: Decimal,
        current_mileage: u64,
        plate: Option<String>,
    ) -> Result<Car, EngineError> {
        if self.store.car_count() >= MAX_CARS {
            return Err(EngineError::LimitExceeded("too many cars"));
        }
        if let Some(ref p) = plate
            && p.len() > MAX_PLATE_LEN {
                return Err(EngineError::LimitExceeded("plate too long"));
            }
        check_rate(daily_rate)?;
        check_mileage(current_mileage)?;
        let registry = self.registry_lock.clone().lock_owned().await;
        if self.store.contains_car(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        resolve_agency(&*self.store, agency_id)?;

        let car = Car {
            id,
            plate,
            agency_id,
            daily_rate,
            current_mileage,
            status: CarStatus::Available,
        };
        self.persist_registration(registry, Event::CarRegistered { car: car.clone() })
            .await?;
        tracing::info!(car_id = %id, %agency_id, "car registered");
        Ok(car)
    }

    /// Targeted car update. RENTED is owned by the rental lifecycle: it can't be
    /// set here, and a RENTED car's status can't be changed here.
    pub async fn update_car(&self, id: Ulid, patch: CarPatch) -> Result<Car, EngineError> {
        if let Some(rate) = patch.daily_rate {
            check_rate(rate)?;
        }
        if let Some(m) = patch.current_mileage {
            check_mileage(m)?;
        }
        if patch.status == Some(CarStatus::Rented) {
            return Err(EngineError::validation("RENTED is set only by check-in"));
        }
        if let Some(agency_id) = patch.agency_id {
            resolve_agency(&*self.store, agency_id)?;
        }

        let guard = self.lock_car(id).await?;
        let mut car = guard.car.clone();
        if let Some(status) = patch.status {
            if car.status == CarStatus::Rented {
                return Err(EngineError::CarUnavailable { car_id: id, status: car.status });
            }
            car.status = status;
        }
        if let Some(m) = patch.current_mileage {
            if m < car.current_mileage {
                return Err(EngineError::validation(format!(
                    "current_mileage {m} is below the recorded {}",
                    car.current_mileage
                )));
            }
            car.current_mileage = m;
        }
        if let Some(agency_id) = patch.agency_id {
            car.agency_id = agency_id;
        }
        if let Some(rate) = patch.daily_rate {
            car.daily_rate = rate;
        }

        self.persist_and_apply(guard, Event::CarUpdated { car: car.clone() })
            .await?;
        tracing::info!(car_id = %id, status = %car.status, "car updated");
        Ok(car)
    }

    /// Removing a car also drops its history. Refused while any rental still holds it.
    pub async fn remove_car(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.lock_car(id).await?;
        if let Some(open) = guard.rentals.iter().find(|r| !r.status.is_terminal()) {
            return Err(EngineError::Conflict(open.id));
        }
        self.persist_and_apply(guard, Event::CarRemoved { id }).await?;
        tracing::info!(car_id = %id, "car removed");
        Ok(())
    }

    // ── Rentals ──────────────────────────────────────────────

    /// Book a car. Everything that doesn't need the car is checked before its lock
    /// is taken; availability, conflict and price are decided under it.
    pub async fn create_rental(&self, req: NewRental) -> Result<Rental, EngineError> {
        let now = now_ms();
        let span = validate_window(req.start_date, req.end_date)?;
        check_not_past(span.start, now)?;
        if let Some(m) = req.start_mileage {
            check_mileage(m)?;
        }
        if self.store.car_for_rental(&req.id).is_some() {
            return Err(EngineError::AlreadyExists(req.id));
        }
        resolve_user(&*self.store, req.user_id)?;
        resolve_agency(&*self.store, req.pickup_agency_id)?;
        let return_agency_id = req.return_agency_id.unwrap_or(req.pickup_agency_id);
        resolve_agency(&*self.store, return_agency_id)?;

        let guard = self.lock_car(req.car_id).await?;
        if guard.rentals.len() >= MAX_RENTALS_PER_CAR {
            return Err(EngineError::LimitExceeded("too many rentals on car"));
        }
        if matches!(guard.car.status, CarStatus::Maintenance | CarStatus::Rented) {
            return Err(EngineError::CarUnavailable {
                car_id: req.car_id,
                status: guard.car.status,
            });
        }
        if let Err(e) = check_no_conflict(&guard, &span, None) {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let same_agency = req.pickup_agency_id == return_agency_id;
        let rate = guard.car.daily_rate;
        let rental = Rental {
            id: req.id,
            user_id: req.user_id,
            car_id: req.car_id,
            pickup_agency_id: req.pickup_agency_id,
            return_agency_id,
            span,
            real_return_date: None,
            daily_rate_snapshot: rate,
            total_value: pricing::estimate(rate, &span, same_agency)?,
            start_mileage: req.start_mileage.unwrap_or(guard.car.current_mileage),
            end_mileage: None,
            status: RentalStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        // Ids are unique across cars, so the claim is made in the shared index.
        if !self.store.reserve_rental(rental.id, rental.car_id) {
            return Err(EngineError::AlreadyExists(rental.id));
        }
        self.persist_and_apply(guard, Event::RentalCreated { rental: rental.clone() })
            .await?;
        metrics::counter!(RENTALS_TOTAL).increment(1);
        tracing::info!(
            rental_id = %rental.id,
            car_id = %rental.car_id,
            total = %rental.total_value,
            "rental created"
        );
        Ok(rental)
    }

    pub async fn confirm_rental(&self, id: Ulid) -> Result<Rental, EngineError> {
        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::Confirm)?;
        let event = Event::RentalConfirmed { id, car_id: rental.car_id, at: now_ms() };
        self.commit_transition(guard, id, Transition::Confirm, event).await
    }

    /// Pickup: rental → ACTIVE and car → RENTED in one commit.
    pub async fn check_in(&self, id: Ulid) -> Result<Rental, EngineError> {
        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::CheckIn)?;
        if guard.car.status != CarStatus::Available {
            return Err(EngineError::CarUnavailable {
                car_id: guard.car.id,
                status: guard.car.status,
            });
        }
        let event = Event::RentalCheckedIn { id, car_id: rental.car_id, at: now_ms() };
        self.commit_transition(guard, id, Transition::CheckIn, event).await
    }

    /// Hand-back: bills the snapshot rate to the actual return date, then
    /// releases the car at the return agency with the final odometer.
    pub async fn finalize_rental(&self, id: Ulid, req: FinalizeRental) -> Result<Rental, EngineError> {
        let end_mileage = req
            .end_mileage
            .ok_or_else(|| EngineError::validation("end_mileage is required to finalize"))?;
        check_mileage(end_mileage)?;

        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::Finalize)?;

        let baseline = rental.start_mileage.max(guard.car.current_mileage);
        if end_mileage < baseline {
            return Err(EngineError::validation(format!(
                "end_mileage {end_mileage} is below the recorded mileage {baseline}"
            )));
        }
        let now = now_ms();
        let returned_at = req.real_return_date.unwrap_or(now);
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&returned_at) {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
        if returned_at < rental.span.start {
            return Err(EngineError::validation("real_return_date precedes start_date"));
        }

        let total_value = pricing::final_cost(
            rental.daily_rate_snapshot,
            rental.span.start,
            returned_at,
            rental.same_agency(),
        )?;
        let event = Event::RentalFinalized {
            id,
            car_id: rental.car_id,
            end_mileage,
            real_return_date: returned_at,
            total_value,
            at: now,
        };
        self.commit_transition(guard, id, Transition::Finalize, event).await
    }

    pub async fn cancel_rental(&self, id: Ulid) -> Result<Rental, EngineError> {
        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::Cancel)?;
        let event = Event::RentalCancelled { id, car_id: rental.car_id, at: now_ms() };
        self.commit_transition(guard, id, Transition::Cancel, event).await
    }

    /// Hard delete. An ACTIVE rental must be finalized first.
    pub async fn remove_rental(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::Remove)?;
        let event = Event::RentalRemoved { id, car_id: rental.car_id };
        self.persist_and_apply(guard, event).await?;
        metrics::counter!(TRANSITIONS_TOTAL, "transition" => "remove").increment(1);
        tracing::info!(rental_id = %id, "rental removed");
        Ok(())
    }

    /// Patch semantics. A status routes to its transition; other fields are merged
    /// while the rental hasn't been picked up. The two can't be mixed.
    pub async fn update_rental(&self, id: Ulid, patch: RentalPatch) -> Result<Rental, EngineError> {
        let closing_fields = patch.end_mileage.is_some() || patch.real_return_date.is_some();
        if let Some(status) = patch.status {
            if patch.has_field_edits() {
                return Err(EngineError::validation(
                    "status changes cannot be combined with other field edits",
                ));
            }
            if closing_fields && status != RentalStatus::Completed {
                return Err(EngineError::validation(
                    "end_mileage and real_return_date require status COMPLETED",
                ));
            }
            return match status {
                RentalStatus::Confirmed => self.confirm_rental(id).await,
                RentalStatus::Active => self.check_in(id).await,
                RentalStatus::Cancelled => self.cancel_rental(id).await,
                RentalStatus::Completed => {
                    let req = FinalizeRental {
                        end_mileage: patch.end_mileage,
                        real_return_date: patch.real_return_date,
                    };
                    self.finalize_rental(id, req).await
                }
                RentalStatus::Pending => Err(EngineError::validation(
                    "a rental cannot be moved back to PENDING",
                )),
            };
        }
        if closing_fields {
            return Err(EngineError::validation(
                "end_mileage and real_return_date require status COMPLETED",
            ));
        }
        if !patch.has_field_edits() {
            return self.get_rental(id).await;
        }
        self.revise_rental(id, patch).await
    }

    async fn revise_rental(&self, id: Ulid, patch: RentalPatch) -> Result<Rental, EngineError> {
        if let Some(m) = patch.start_mileage {
            check_mileage(m)?;
        }
        if let Some(agency_id) = patch.return_agency_id {
            resolve_agency(&*self.store, agency_id)?;
        }

        let guard = self.lock_rental(id).await?;
        let rental = current(&guard, id)?;
        lifecycle::check(rental, Transition::Revise)?;

        let now = now_ms();
        let start = patch.start_date.unwrap_or(rental.span.start);
        let end = patch.end_date.unwrap_or(rental.span.end);
        let span = validate_window(start, end)?;
        if patch.start_date.is_some() {
            check_not_past(span.start, now)?;
        }
        if span != rental.span {
            check_no_conflict(&guard, &span, Some(id))?;
        }
        let return_agency_id = patch.return_agency_id.unwrap_or(rental.return_agency_id);
        let total_value = pricing::estimate(
            rental.daily_rate_snapshot,
            &span,
            rental.pickup_agency_id == return_agency_id,
        )?;

        let event = Event::RentalRevised {
            id,
            car_id: rental.car_id,
            span,
            return_agency_id,
            start_mileage: patch.start_mileage.unwrap_or(rental.start_mileage),
            total_value,
            at: now,
        };
        self.commit_transition(guard, id, Transition::Revise, event).await
    }

    async fn commit_transition(
        &self,
        ledger: OwnedRwLockWriteGuard<CarLedger>,
        id: Ulid,
        transition: Transition,
        event: Event,
    ) -> Result<Rental, EngineError> {
        let ledger = self.persist_and_apply(ledger, event).await?;
        let rental = current(&ledger, id)?.clone();
        metrics::counter!(TRANSITIONS_TOTAL, "transition" => transition_label(transition))
            .increment(1);
        tracing::info!(rental_id = %id, %transition, status = %rental.status, "rental updated");
        Ok(rental)
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    /// The registry lock and a read lock on every ledger are held until the rewrite
    /// lands, so no event can slip in between the snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registry = self.registry_lock.lock().await;
        let mut events: Vec<Event> = Vec::new();
        for agency in self.store.agencies() {
            events.push(Event::AgencyRegistered { id: agency.id, name: agency.name });
        }
        for user in self.store.users() {
            events.push(Event::UserRegistered { id: user.id, name: user.name });
        }

        let mut guards = Vec::new();
        for (_, ledger) in self.store.ledgers() {
            let guard = ledger.read_owned().await;
            if guard.retired {
                continue;
            }
            events.push(Event::CarRegistered { car: guard.car.clone() });
            for rental in &guard.rentals {
                events.push(Event::RentalCreated { rental: rental.clone() });
            }
            guards.push(guard);
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Internal("storage unavailable"))?;
        let result = rx
            .await
            .map_err(|_| EngineError::Internal("storage unavailable"))?;
        drop(guards);
        match result {
            Ok(()) => {
                tracing::info!(events = count, "WAL compacted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "WAL compaction failed");
                Err(EngineError::Internal("storage write failed"))
            }
        }
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn current(ledger: &CarLedger, id: Ulid) -> Result<&Rental, EngineError> {
    ledger.rental(id).ok_or(EngineError::NotFound(Entity::Rental, id))
}

fn transition_label(t: Transition) -> &'static str {
    match t {
        Transition::Confirm => "confirm",
        Transition::CheckIn => "check_in",
        Transition::Finalize => "finalize",
        Transition::Cancel => "cancel",
        Transition::Revise => "revise",
        Transition::Remove => "remove",
    }
}
