//! Payment Settlement
//!
//! Local payment collection for one persisted order. The settlement only
//! tracks what has been collected; closing the order against the gateway
//! is driven by the controller once [`Settlement::is_fully_paid`] holds.

use shared::models::{PaymentMethod, PaymentRecord};

use crate::money;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    /// Waiting for a quick full payment or a split entry
    AwaitingMethod,
    /// Operator is entering partial amounts
    EnteringSplitAmount,
    /// Order closed; no further payments accepted
    Settled,
}

/// Result of recording one payment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaymentOutcome {
    /// Balance still open
    Partial { remaining: f64 },
    /// Collected covers the total
    FullyPaid { change: f64 },
}

#[derive(Debug, Clone)]
pub struct Settlement {
    order_id: String,
    total: f64,
    phase: SettlementPhase,
    payments: Vec<PaymentRecord>,
    /// Close call in flight
    closing: bool,
}

impl Settlement {
    pub fn new(order_id: impl Into<String>, total: f64) -> Self {
        Self {
            order_id: order_id.into(),
            total,
            phase: SettlementPhase::AwaitingMethod,
            payments: Vec::new(),
            closing: false,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn phase(&self) -> SettlementPhase {
        self.phase
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    pub fn collected(&self) -> f64 {
        money::sum_amounts(self.payments.iter().map(|p| p.amount))
    }

    /// max(0, total - collected)
    pub fn remaining(&self) -> f64 {
        money::remaining(self.total, self.collected())
    }

    pub fn is_fully_paid(&self) -> bool {
        money::is_fully_paid(self.total, self.collected())
    }

    /// Cash to hand back when more than the total was collected
    pub fn change_due(&self) -> f64 {
        money::remaining(self.collected(), self.total)
    }

    pub fn is_settled(&self) -> bool {
        self.phase == SettlementPhase::Settled
    }

    /// Switch to split entry
    pub fn begin_split(&mut self) -> ClientResult<()> {
        self.ensure_open()?;
        self.phase = SettlementPhase::EnteringSplitAmount;
        Ok(())
    }

    /// Leave split entry; collected payments are kept
    pub fn cancel_split(&mut self) {
        if self.phase == SettlementPhase::EnteringSplitAmount {
            self.phase = SettlementPhase::AwaitingMethod;
        }
    }

    /// Collect the whole remaining balance with one method
    pub fn pay_full(&mut self, method: PaymentMethod) -> ClientResult<PaymentOutcome> {
        self.ensure_open()?;
        let amount = self.remaining();
        self.record(method, amount)
    }

    /// Collect an operator-typed partial amount
    pub fn pay_split(&mut self, method: PaymentMethod, input: &str) -> ClientResult<PaymentOutcome> {
        let amount: f64 = input.trim().replace(',', ".").parse().map_err(|_| {
            ClientError::Validation(format!("'{}' is not a valid amount", input.trim()))
        })?;
        money::validate_payment_amount(amount)?;
        self.ensure_open()?;
        self.phase = SettlementPhase::EnteringSplitAmount;
        self.record(method, money::to_f64(money::to_decimal(amount)))
    }

    /// Follow a newer version of the order; collected payments are kept
    pub(crate) fn set_total(&mut self, total: f64) {
        if self.is_settled() || self.total == total {
            return;
        }
        tracing::info!(
            order_id = %self.order_id,
            previous = self.total,
            total,
            collected = self.collected(),
            "Settlement total changed"
        );
        self.total = total;
    }

    /// Claim the close call; fails while one is in flight
    pub(crate) fn begin_close(&mut self) -> ClientResult<()> {
        if self.is_settled() {
            return Err(ClientError::Validation("order is already settled".to_string()));
        }
        if !self.is_fully_paid() {
            return Err(ClientError::Validation(format!(
                "{:.2} still to collect",
                self.remaining()
            )));
        }
        if self.closing {
            return Err(ClientError::Busy);
        }
        self.closing = true;
        Ok(())
    }

    /// Close failed, allow a retry
    pub(crate) fn abort_close(&mut self) {
        self.closing = false;
    }

    pub(crate) fn mark_settled(&mut self) {
        self.closing = false;
        self.phase = SettlementPhase::Settled;
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.is_settled() {
            return Err(ClientError::Validation("order is already settled".to_string()));
        }
        if self.is_fully_paid() {
            return Err(ClientError::Validation("order is already fully paid".to_string()));
        }
        Ok(())
    }

    fn record(&mut self, method: PaymentMethod, amount: f64) -> ClientResult<PaymentOutcome> {
        money::validate_payment_amount(amount)?;
        self.payments.push(PaymentRecord::new(method, amount));
        tracing::info!(
            order_id = %self.order_id,
            %method,
            amount,
            collected = self.collected(),
            "Payment recorded"
        );

        if self.is_fully_paid() {
            Ok(PaymentOutcome::FullyPaid {
                change: self.change_due(),
            })
        } else {
            Ok(PaymentOutcome::Partial {
                remaining: self.remaining(),
            })
        }
    }
}
