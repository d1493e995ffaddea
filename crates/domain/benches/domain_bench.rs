use std::hint::black_box;

use chrono::NaiveDate;
use common::{Money, PromotionId, UserId, Version};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::promotion::{self, DiscountType, Promotion, PromotionStatus};
use domain::{Order, OrderItem};

fn save10() -> Promotion {
    Promotion {
        id: PromotionId::new(),
        code: "SAVE10".to_string(),
        description: None,
        discount_type: DiscountType::Percent,
        discount_value: 10.0,
        starts_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ends_on: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        min_order_amount: Money::from_major(50),
        usage_limit: 0,
        used_count: 0,
        status: PromotionStatus::Active,
        version: Version::initial(),
    }
}

fn bench_promotion_evaluate(c: &mut Criterion) {
    let promotion = save10();
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    c.bench_function("promotion_evaluate", |b| {
        b.iter(|| {
            promotion::evaluate(
                black_box(&promotion),
                black_box(Money::from_major(100)),
                black_box(today),
            )
        })
    });
}

fn bench_order_totals(c: &mut Criterion) {
    let items: Vec<OrderItem> = (0..50u32)
        .map(|n| OrderItem::new(format!("SKU-{n}"), (n % 5) + 1, Money::from_cents(999)))
        .collect();

    c.bench_function("order_create_50_lines", |b| {
        b.iter(|| {
            Order::create(
                black_box(UserId::new()),
                None,
                None,
                black_box(Money::from_cents(2_000)),
                black_box(items.clone()),
            )
        })
    });
}

criterion_group!(benches, bench_promotion_evaluate, bench_order_totals);
criterion_main!(benches);
