//! Order lifecycle: model and service.

pub mod model;
pub mod service;

pub use model::{Order, OrderItem, OrderStatus, Payment, PaymentMethod};
pub use service::{
    Caller, CreateOrderRequest, OrderLine, OrderService, OrderSummary,
};
