use ulid::Ulid;

use crate::model::*;

use super::conflict::{blocking_rentals, find_conflict, validate_query_window};
use super::{Engine, EngineError, Entity};

impl Engine {
    pub async fn get_rental(&self, id: Ulid) -> Result<Rental, EngineError> {
        let not_found = EngineError::NotFound(Entity::Rental, id);
        let Some(car_id) = self.store.car_for_rental(&id) else {
            return Err(not_found);
        };
        let Some(ledger) = self.store.get_ledger(&car_id) else {
            return Err(not_found);
        };
        let guard = ledger.read().await;
        guard.rental(id).cloned().ok_or(not_found)
    }

    pub async fn get_car(&self, id: Ulid) -> Result<Car, EngineError> {
        let ledger = self
            .store
            .get_ledger(&id)
            .ok_or(EngineError::NotFound(Entity::Car, id))?;
        let guard = ledger.read().await;
        if guard.retired {
            return Err(EngineError::NotFound(Entity::Car, id));
        }
        Ok(guard.car.clone())
    }

    /// All cars, by id.
    pub async fn list_cars(&self) -> Vec<Car> {
        let mut cars = Vec::new();
        for (_, ledger) in self.store.ledgers() {
            let guard = ledger.read().await;
            if !guard.retired {
                cars.push(guard.car.clone());
            }
        }
        cars
    }

    /// Rentals matching every set filter field, ordered by start date.
    pub async fn list_rentals(&self, filter: &RentalFilter) -> Vec<Rental> {
        let ledgers = match filter.car_id {
            Some(car_id) => self
                .store
                .get_ledger(&car_id)
                .map(|l| vec![(car_id, l)])
                .unwrap_or_default(),
            None => self.store.ledgers(),
        };
        let mut out = Vec::new();
        for (_, ledger) in ledgers {
            let guard = ledger.read().await;
            out.extend(guard.rentals.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by_key(|r| (r.span.start, r.id));
        out
    }

    /// Would `[start, end]` collide with a rental that still holds the car?
    pub async fn has_conflict(
        &self,
        car_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = validate_query_window(start, end)?;
        let ledger = self
            .store
            .get_ledger(&car_id)
            .ok_or(EngineError::NotFound(Entity::Car, car_id))?;
        let guard = ledger.read().await;
        Ok(find_conflict(&guard, &span, exclude).is_some())
    }

    /// The rentals that would block a booking of `[start, end]`.
    pub async fn find_conflicts(
        &self,
        car_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<Rental>, EngineError> {
        let span = validate_query_window(start, end)?;
        let ledger = self
            .store
            .get_ledger(&car_id)
            .ok_or(EngineError::NotFound(Entity::Car, car_id))?;
        let guard = ledger.read().await;
        Ok(blocking_rentals(&guard, &span, None).cloned().collect())
    }

    pub fn list_agencies(&self) -> Vec<Agency> {
        self.store.agencies()
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.users()
    }
}
