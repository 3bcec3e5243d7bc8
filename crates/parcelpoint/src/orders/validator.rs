/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! State rules for order operations.

use std::sync::Arc;

use chrono::Duration;

use super::models::{AcceptOrderRequest, Order, OrderStatus};
use crate::clock::Clock;
use crate::error::OrderError;

/// How many hours after issue a client may still return an order.
pub const RETURN_WINDOW_HOURS: i64 = 48;

/// Checks order state transitions against the current time.
#[derive(Clone)]
pub struct OrderValidator {
    clock: Arc<dyn Clock>,
}

impl OrderValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// The storage deadline must be in the future and the id unused.
    pub fn validate_accept(
        &self,
        existing: Option<&Order>,
        req: &AcceptOrderRequest,
    ) -> Result<(), OrderError> {
        if req.expires_at < self.clock.now() {
            return Err(OrderError::Validation(
                "expires date is in the past".to_string(),
            ));
        }
        if existing.is_some() {
            return Err(OrderError::AlreadyExists(req.order_id));
        }
        Ok(())
    }

    /// Only the owner can collect an accepted order within its storage
    /// period.
    pub fn validate_issue(&self, order: &Order, user_id: i64) -> Result<(), OrderError> {
        if order.user_id != user_id {
            return Err(OrderError::Validation(format!(
                "order {} belongs to different user",
                order.order_id
            )));
        }
        if order.status != OrderStatus::Accepted {
            return Err(OrderError::Validation(format!(
                "order {} status is {}, not ACCEPTED",
                order.order_id, order.status
            )));
        }
        if order.expires_at < self.clock.now() {
            return Err(OrderError::StorageExpired(order.order_id));
        }
        Ok(())
    }

    /// Only the owner can return an issued order, within
    /// [`RETURN_WINDOW_HOURS`] of issue.
    pub fn validate_client_return(&self, order: &Order, user_id: i64) -> Result<(), OrderError> {
        if order.user_id != user_id {
            return Err(OrderError::Validation(format!(
                "order {} belongs to another user",
                order.order_id
            )));
        }
        if order.status != OrderStatus::Issued {
            return Err(OrderError::Validation(format!(
                "order {} status is {}, not ISSUED",
                order.order_id, order.status
            )));
        }
        if self.clock.now() - order.updated_status_at > Duration::hours(RETURN_WINDOW_HOURS) {
            return Err(OrderError::Validation(format!(
                "return window expired for order {}",
                order.order_id
            )));
        }
        Ok(())
    }

    /// Client returns go back at any time; unclaimed orders only once their
    /// storage period is over. Issued orders are no longer at the point.
    pub fn validate_return_to_courier(&self, order: &Order) -> Result<(), OrderError> {
        match order.status {
            OrderStatus::Returned => Ok(()),
            OrderStatus::Issued => Err(OrderError::NotFound(order.order_id)),
            OrderStatus::Accepted if order.expires_at > self.clock.now() => {
                Err(OrderError::Validation(format!(
                    "cannot return order {} before expiration",
                    order.order_id
                )))
            }
            OrderStatus::Accepted => Ok(()),
        }
    }
}
