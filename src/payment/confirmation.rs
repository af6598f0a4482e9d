//! Payment confirmation state machine.
//!
//! Reconciles a gateway return (redirect or callback) with the order parked in
//! session storage. The current state is persisted under
//! `payment_state_<payId>`; a settled state is returned as-is on re-entry, and
//! the `order_created_<payId>` marker guarantees one order per payment.

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{CallbackParams, GatewayStatus, PaymentGateway};
use crate::domain::aggregates::{CartStore, OrderStatus};
use crate::domain::events::{EventPublisher, StoreEvent};
use crate::services::orders::OrderService;
use crate::storage::{keys, remember_order, KeyValueStore, PendingPaymentSession};

/// How far a redirect-supplied status is trusted when verification is unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RedirectTrust {
    /// Only a verified callback or a definitive status check confirms a payment.
    #[default]
    Strict,
    /// Accepts a redirect `SUCCESS`/`OK` when the signature or status check fails,
    /// and an unknown payment as paid. Sandbox use only.
    SandboxFallback,
}

impl RedirectTrust {
    pub fn from_flag(trust_redirect: bool) -> Self {
        if trust_redirect {
            Self::SandboxFallback
        } else {
            Self::Strict
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    Loading,
    Verifying,
    Finalizing,
    /// `degraded`: payment confirmed but no pending order was left to create.
    #[serde(rename_all = "camelCase")]
    Success { order_id: Option<String>, degraded: bool },
    Failed { reason: FailureReason },
}

impl ConfirmationState {
    /// Settled states are final for the payment id; the rest may be retried.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { reason: FailureReason::Declined { .. } })
    }

    pub fn is_success(&self) -> bool { matches!(self, Self::Success { .. }) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    MissingParameters,
    Declined { message: Option<String> },
    /// Gateway could not confirm either way.
    StatusUnknown,
    /// Payment confirmed, order persistence failed; the pending order is kept.
    OrderNotSaved { message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub pay_id: Option<String>,
    #[serde(flatten)]
    pub state: ConfirmationState,
    /// True when the result came from an earlier run for the same payment.
    pub replayed: bool,
}

enum Step {
    CheckIdempotency,
    Verify,
    Finalize,
    Fail(FailureReason),
    Done(ConfirmationState),
}

impl Step {
    fn token(&self) -> ConfirmationState {
        match self {
            Self::CheckIdempotency => ConfirmationState::Loading,
            Self::Verify | Self::Fail(_) => ConfirmationState::Verifying,
            Self::Finalize => ConfirmationState::Finalizing,
            Self::Done(state) => state.clone(),
        }
    }
}

pub struct PaymentConfirmation<'a> {
    pub gateway: &'a dyn PaymentGateway,
    pub orders: &'a OrderService,
    pub events: &'a EventPublisher,
    pub trust: RedirectTrust,
}

impl<'a> PaymentConfirmation<'a> {
    pub fn new(gateway: &'a dyn PaymentGateway, orders: &'a OrderService, events: &'a EventPublisher, trust: RedirectTrust) -> Self {
        Self { gateway, orders, events, trust }
    }

    /// Drives the machine from the stored state to a terminal one.
    #[instrument(skip_all, fields(pay_id = tracing::field::Empty))]
    pub async fn run<S: KeyValueStore, L: KeyValueStore>(&self, params: &CallbackParams, session: &mut S, local: &mut L, cart: &mut CartStore) -> Outcome {
        let pay_id = params.pay_id.clone().filter(|p| !p.is_empty()).or_else(|| session.get(keys::LAST_PAY_ID).filter(|p| !p.is_empty()));
        let Some(pay_id) = pay_id else {
            warn!("payment return without pay id");
            return Outcome { pay_id: None, state: ConfirmationState::Failed { reason: FailureReason::MissingParameters }, replayed: false };
        };
        tracing::Span::current().record("pay_id", pay_id.as_str());

        let token_key = keys::payment_state(&pay_id);
        match session.get_json::<ConfirmationState>(&token_key) {
            Ok(Some(state)) if state.is_settled() => return Outcome { pay_id: Some(pay_id), state, replayed: true },
            Ok(_) => {}
            Err(e) => warn!(error = %e, "discarding unreadable confirmation state"),
        }

        let mut replayed = false;
        let mut step = Step::CheckIdempotency;
        loop {
            if let Err(e) = session.set_json(&token_key, &step.token()) {
                warn!(error = %e, "could not persist confirmation state");
            }
            step = match step {
                Step::CheckIdempotency => match session.get(&keys::order_created(&pay_id)) {
                    // The order exists but an earlier run stopped before finishing up.
                    Some(_) if pending_for(session, &pay_id) => {
                        replayed = true;
                        Step::Finalize
                    }
                    Some(order_id) => {
                        replayed = true;
                        Step::Done(ConfirmationState::Success { order_id: Some(order_id), degraded: false })
                    }
                    None => Step::Verify,
                },
                Step::Verify => self.verify(&pay_id, params).await,
                Step::Finalize => self.finalize(&pay_id, session, local, cart).await,
                Step::Fail(reason) => self.fail(&pay_id, reason, session).await,
                Step::Done(state) => return Outcome { pay_id: Some(pay_id), state, replayed },
            };
        }
    }

    async fn verify(&self, pay_id: &str, params: &CallbackParams) -> Step {
        let fallback = self.trust == RedirectTrust::SandboxFallback;
        let redirect_ok = params.redirect_status() == Some(GatewayStatus::Success);

        if params.carries_outcome() {
            match self.gateway.process_callback(params).await {
                Ok(report) if report.status == GatewayStatus::Success => return Step::Finalize,
                Ok(report) if report.status.is_failure() => {
                    return Step::Fail(FailureReason::Declined { message: report.message.or_else(|| params.status.clone()) });
                }
                Ok(_) => {}
                Err(e) if fallback && redirect_ok => {
                    warn!(error = %e, "callback unverified, accepting redirect status");
                    return Step::Finalize;
                }
                Err(e) => warn!(error = %e, "callback unverified, asking gateway for status"),
            }
        }

        match self.gateway.check_status(pay_id, params.order_id.as_deref()).await {
            Ok(report) => match report.status {
                GatewayStatus::Success => Step::Finalize,
                status if status.is_failure() => Step::Fail(FailureReason::Declined { message: report.message.or_else(|| params.status.clone()) }),
                status if fallback => {
                    warn!(?status, "payment not settled at gateway, accepting in sandbox mode");
                    Step::Finalize
                }
                status => {
                    warn!(?status, "payment not settled at gateway");
                    Step::Fail(FailureReason::StatusUnknown)
                }
            },
            Err(e) if fallback && redirect_ok => {
                warn!(error = %e, "status check failed, accepting redirect status");
                Step::Finalize
            }
            Err(e) => {
                error!(error = %e, "status check failed");
                Step::Fail(FailureReason::StatusUnknown)
            }
        }
    }

    async fn finalize<S: KeyValueStore, L: KeyValueStore>(&self, pay_id: &str, session: &mut S, local: &mut L, cart: &mut CartStore) -> Step {
        let pending = PendingPaymentSession::load(session).unwrap_or_else(|e| {
            warn!(error = %e, "pending order unreadable");
            None
        });
        let pending = match pending {
            Some(p) if p.pay_id == pay_id => p,
            other => {
                warn!(outcome = "degraded_success", stale_pending = other.is_some(), "payment confirmed without a pending order");
                session.remove(keys::LAST_PAY_ID);
                return Step::Done(ConfirmationState::Success { order_id: None, degraded: true });
            }
        };

        // The marker goes down as soon as the order is stored; everything after
        // it can be resumed from the pending order without a second insert.
        let order = match self.orders.persist(&pending.order_data, Some(pay_id)).await {
            Ok((order, _)) => order,
            Err(e) => {
                error!(error = %e, "paid order could not be saved");
                return Step::Done(ConfirmationState::Failed { reason: FailureReason::OrderNotSaved { message: e.to_string() } });
            }
        };
        session.set(&keys::order_created(pay_id), order.id.clone());
        if order.status() == OrderStatus::Pending {
            if let Err(e) = self.orders.confirm(&order.id).await {
                warn!(error = %e, order_id = %order.id, "order saved but left pending");
            }
        }
        if let Err(e) = remember_order(local, &order.id, Some(pay_id)) {
            warn!(error = %e, "order history not updated");
        }
        PendingPaymentSession::discard(session);
        cart.clear();
        self.orders.reserve_stock(&order).await;
        info!(order_id = %order.id, "paid order created");
        Step::Done(ConfirmationState::Success { order_id: Some(order.id), degraded: false })
    }

    async fn fail<S: KeyValueStore>(&self, pay_id: &str, reason: FailureReason, session: &mut S) -> Step {
        if let FailureReason::Declined { message } = &reason {
            PendingPaymentSession::discard(session);
            let reason = message.clone().unwrap_or_else(|| "declined".into());
            self.events.publish(StoreEvent::PaymentFailed { pay_id: pay_id.to_string(), reason }).await;
        }
        warn!(?reason, "payment not confirmed");
        Step::Done(ConfirmationState::Failed { reason })
    }
}

fn pending_for<S: KeyValueStore>(session: &S, pay_id: &str) -> bool {
    matches!(PendingPaymentSession::load(session), Ok(Some(p)) if p.pay_id == pay_id)
}
