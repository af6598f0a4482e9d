//! Order persistence, stock bookkeeping and status management.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    CategoryKey, CustomerInfo, Delivery, DeliveryMethod, Order, OrderDraft, OrderError, OrderLine, OrderStatus,
    OrderTotals, Payment, PaymentMethod, PostalAddress,
};
use crate::domain::events::{EventPublisher, StoreEvent};
use crate::persistence::{PersistenceError, Row, RowStore};

pub const ORDERS_TABLE: &str = "orders";

/// Tables searched, in order, when decrementing stock for an ordered product.
const STOCK_TABLES: [CategoryKey; 14] = [
    CategoryKey::Gene, CategoryKey::Adezive, CategoryKey::Preparate, CategoryKey::IngrijirePersonala,
    CategoryKey::Accesorii, CategoryKey::Consumabile, CategoryKey::Ustensile, CategoryKey::TehnologieLed,
    CategoryKey::HenaSprancene, CategoryKey::VopseleProfesionale, CategoryKey::PensuleInstrumenteSpeciale,
    CategoryKey::SolutiiLaminare, CategoryKey::AdeziveLaminare, CategoryKey::AccesoriiSpecifice,
];

#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("order {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("stored order is malformed: {0}")]
    Malformed(String),
}

/// Flat `orders` row layout.
#[derive(Serialize, Deserialize)]
struct OrderRow {
    id: String,
    customer_first_name: String,
    customer_last_name: String,
    customer_email: String,
    customer_phone: String,
    customer_address: String,
    customer_city: String,
    customer_postal_code: String,
    delivery_method: DeliveryMethod,
    delivery_price: Decimal,
    payment_method: PaymentMethod,
    subtotal: Decimal,
    delivery_cost: Decimal,
    total_amount: Decimal,
    #[serde(default)]
    notes: Option<String>,
    status: OrderStatus,
    items: Vec<OrderLine>,
    #[serde(default)]
    pay_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn new(id: String, d: &OrderDraft, pay_id: Option<&str>, now: DateTime<Utc>) -> Self {
        let c = &d.customer;
        Self {
            id,
            customer_first_name: c.first_name.clone(),
            customer_last_name: c.last_name.clone(),
            customer_email: c.email.clone(),
            customer_phone: c.phone.clone(),
            customer_address: c.address.street.clone(),
            customer_city: c.address.city.clone(),
            customer_postal_code: c.address.postal_code.clone(),
            delivery_method: d.delivery.method,
            delivery_price: d.delivery.price,
            payment_method: d.payment.method,
            subtotal: d.totals.subtotal,
            delivery_cost: d.totals.delivery,
            total_amount: d.totals.total,
            notes: Some(d.notes.clone()).filter(|n| !n.is_empty()),
            status: d.status,
            items: d.items.clone(),
            pay_id: pay_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    fn into_order(self) -> Order {
        let customer = CustomerInfo {
            first_name: self.customer_first_name,
            last_name: self.customer_last_name,
            email: self.customer_email,
            phone: self.customer_phone,
            address: PostalAddress { street: self.customer_address, city: self.customer_city, postal_code: self.customer_postal_code },
        };
        let draft = OrderDraft {
            customer,
            items: self.items,
            delivery: Delivery { method: self.delivery_method, price: self.delivery_price },
            payment: Payment { method: self.payment_method },
            totals: OrderTotals { subtotal: self.subtotal, delivery: self.delivery_cost, total: self.total_amount },
            notes: self.notes.unwrap_or_default(),
            status: self.status,
        };
        Order { id: self.id, draft, created_at: self.created_at, updated_at: self.updated_at }
    }
}

fn to_row(row: &OrderRow) -> Result<Row, OrderServiceError> {
    match serde_json::to_value(row).map_err(|e| OrderServiceError::Malformed(e.to_string()))? {
        Value::Object(map) => Ok(map),
        _ => Err(OrderServiceError::Malformed("order row is not an object".into())),
    }
}

fn from_row(row: Row) -> Result<(Order, Option<String>), OrderServiceError> {
    let parsed: OrderRow = serde_json::from_value(Value::Object(row)).map_err(|e| OrderServiceError::Malformed(e.to_string()))?;
    let pay_id = parsed.pay_id.clone();
    Ok((parsed.into_order(), pay_id))
}

fn stock_of(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))).unwrap_or(0)
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn RowStore>,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn RowStore>, events: EventPublisher) -> Self { Self { store, events } }

    /// Persists a draft as a new order, then decrements stock for its lines.
    #[instrument(skip(self, draft), fields(email = %draft.customer.email, total = %draft.totals.total))]
    pub async fn create(&self, draft: &OrderDraft, pay_id: Option<&str>) -> Result<Order, OrderServiceError> {
        let (order, fresh) = self.persist(draft, pay_id).await?;
        if fresh { self.reserve_stock(&order).await; }
        Ok(order)
    }

    /// Stores the order without touching stock. At most one order exists per
    /// payment id: when one is already stored it is returned with `false`.
    pub async fn persist(&self, draft: &OrderDraft, pay_id: Option<&str>) -> Result<(Order, bool), OrderServiceError> {
        if draft.items.is_empty() { return Err(OrderError::NoItems.into()); }
        if let Some(existing) = self.find_by_pay_id(pay_id).await? {
            info!(order_id = %existing.id, "order already stored for payment");
            return Ok((existing, false));
        }
        let row = OrderRow::new(Uuid::now_v7().to_string(), draft, pay_id, Utc::now());
        let saved = match self.store.insert(ORDERS_TABLE, to_row(&row)?).await {
            Ok(saved) => saved,
            Err(PersistenceError::Conflict { .. }) if pay_id.is_some() => {
                let existing = self.find_by_pay_id(pay_id).await?;
                return existing.map(|o| (o, false)).ok_or_else(|| OrderServiceError::NotFound(pay_id.unwrap_or_default().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let (order, _) = from_row(saved)?;
        info!(order_id = %order.id, "order created");
        self.events.publish(StoreEvent::OrderPlaced {
            order_id: order.id.clone(),
            email: order.draft.customer.email.clone(),
            total: order.draft.totals.total,
            payment_method: order.draft.payment.method.as_str().to_string(),
        }).await;
        Ok((order, true))
    }

    async fn find_by_pay_id(&self, pay_id: Option<&str>) -> Result<Option<Order>, OrderServiceError> {
        let Some(pay_id) = pay_id else { return Ok(None) };
        let row = self.store.find(ORDERS_TABLE, "pay_id", &json!(pay_id)).await?;
        Ok(row.map(from_row).transpose()?.map(|(order, _)| order))
    }

    pub async fn get(&self, id: &str) -> Result<Order, OrderServiceError> {
        let row = self.store.find(ORDERS_TABLE, "id", &json!(id)).await?.ok_or_else(|| OrderServiceError::NotFound(id.to_string()))?;
        Ok(from_row(row)?.0)
    }

    /// Moves a paid order from pending to confirmed.
    pub async fn confirm(&self, id: &str) -> Result<Order, OrderServiceError> {
        let (order, pay_id) = self.transition(id, OrderStatus::Confirmed).await?;
        self.events.publish(StoreEvent::OrderConfirmed { order_id: order.id.clone(), pay_id }).await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Order, OrderServiceError> {
        let (order, _) = self.transition(id, status).await?;
        self.events.publish(StoreEvent::OrderStatusChanged { order_id: order.id.clone(), status: status.to_string() }).await;
        Ok(order)
    }

    /// Newest first.
    pub async fn list_by_email(&self, email: &str) -> Result<Vec<Order>, OrderServiceError> {
        let rows = self.store.find_all(ORDERS_TABLE, "customer_email", &json!(email)).await?;
        let mut orders = rows.into_iter().map(|r| from_row(r).map(|(o, _)| o)).collect::<Result<Vec<_>, _>>()?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition(&self, id: &str, status: OrderStatus) -> Result<(Order, Option<String>), OrderServiceError> {
        let row = self.store.find(ORDERS_TABLE, "id", &json!(id)).await?.ok_or_else(|| OrderServiceError::NotFound(id.to_string()))?;
        let (mut order, pay_id) = from_row(row)?;
        order.transition(status)?;
        let mut patch = Row::new();
        patch.insert("status".into(), json!(status.as_str()));
        patch.insert("updated_at".into(), json!(order.updated_at));
        self.store.update(ORDERS_TABLE, patch, "id", &json!(id)).await?;
        Ok((order, pay_id))
    }

    /// Decrements stock for every line of the order. Best effort: a stock
    /// write failure never fails the order.
    pub async fn reserve_stock(&self, order: &Order) {
        for line in &order.draft.items {
            let key = json!(line.product_id);
            for category in STOCK_TABLES {
                let table = category.table();
                let product = match self.store.find(table, "id", &key).await {
                    Ok(Some(product)) => product,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, table, "stock lookup failed");
                        continue;
                    }
                };
                let quantity = i64::from(line.quantity);
                let mut patch = Row::new();
                patch.insert("store_stock".into(), json!((stock_of(&product, "store_stock") - quantity).max(0)));
                patch.insert("total_stock".into(), json!((stock_of(&product, "total_stock") - quantity).max(0)));
                if let Err(e) = self.store.update(table, patch, "id", &key).await {
                    warn!(error = %e, table, product_id = %line.product_id, "stock update failed");
                }
                break;
            }
        }
    }
}
