#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use adress_storefront::payment::{
    CallbackParams, GatewayError, GatewayStatus, PaymentGateway, PaymentRequest, PaymentSession, RefundReport, StatusReport,
};

#[derive(Clone, Copy, Debug)]
pub enum Script {
    Status(GatewayStatus),
    Unreachable,
}

impl Script {
    fn play(self, unreachable: GatewayError) -> Result<StatusReport, GatewayError> {
        match self {
            Self::Status(status) => Ok(StatusReport::new(status)),
            Self::Unreachable => Err(unreachable),
        }
    }
}

/// In-process gateway whose answers are set by the test.
pub struct ScriptedGateway {
    pub pay_id: String,
    callback: Mutex<Script>,
    status: Mutex<Script>,
    pub initiated: AtomicUsize,
    pub status_checks: AtomicUsize,
    pub refunds: Mutex<Vec<(String, Option<Decimal>)>>,
}

impl ScriptedGateway {
    pub fn new(pay_id: &str, callback: Script, status: Script) -> Self {
        Self {
            pay_id: pay_id.to_string(),
            callback: Mutex::new(callback),
            status: Mutex::new(status),
            initiated: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
            refunds: Mutex::new(vec![]),
        }
    }

    pub fn approving(pay_id: &str) -> Self {
        Self::new(pay_id, Script::Status(GatewayStatus::Success), Script::Status(GatewayStatus::Success))
    }

    pub fn set_status(&self, script: Script) { *self.status.lock().unwrap() = script; }
    pub fn set_callback(&self, script: Script) { *self.callback.lock().unwrap() = script; }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        self.initiated.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession { pay_id: self.pay_id.clone(), redirect_url: format!("https://pay.example.com/{}", self.pay_id) })
    }

    async fn check_status(&self, _pay_id: &str, _order_id: Option<&str>) -> Result<StatusReport, GatewayError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let script = *self.status.lock().unwrap();
        script.play(GatewayError::Http { status: 503, message: "maintenance".into() })
    }

    async fn process_callback(&self, _params: &CallbackParams) -> Result<StatusReport, GatewayError> {
        let script = *self.callback.lock().unwrap();
        script.play(GatewayError::InvalidSignature)
    }

    async fn refund(&self, pay_id: &str, amount: Option<Decimal>) -> Result<RefundReport, GatewayError> {
        self.refunds.lock().unwrap().push((pay_id.to_string(), amount));
        Ok(RefundReport { ok: true, status: Some("OK".into()), amount })
    }
}
