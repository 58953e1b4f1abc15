//! Listing filters and dashboard figures over cached records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Category, Order, OrderStatus, Product};

/// Narrows the product list. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    pub category: Option<Category>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(search) => {
                let needle = search.to_lowercase();
                product.name.to_lowercase().contains(&needle)
                    || product
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
        };
        let matches_category = self
            .category
            .as_ref()
            .map_or(true, |category| &product.category == category);
        matches_search && matches_category
    }

    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        products.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Narrows the order list. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Creation date in UTC. Orders without a creation time never match.
    pub date: Option<NaiveDate>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let matches_status = self.status.map_or(true, |status| order.status == status);
        let matches_date = self.date.map_or(true, |date| created_on(order, date));
        matches_status && matches_date
    }

    pub fn apply<'a>(&self, orders: &'a [Order]) -> Vec<&'a Order> {
        orders.iter().filter(|o| self.matches(o)).collect()
    }
}

fn created_on(order: &Order, date: NaiveDate) -> bool {
    order
        .created_at
        .is_some_and(|created_at| created_at.date_naive() == date)
}

/// Figures shown at the top of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub orders_today: usize,
    pub pending: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue_today: Decimal,
}

impl DashboardStats {
    /// Computes the figures for `today` (a UTC date).
    pub fn compute(orders: &[Order], today: NaiveDate) -> Self {
        let mut stats = DashboardStats::default();
        for order in orders {
            if created_on(order, today) {
                stats.orders_today += 1;
                stats.revenue_today += order.total;
            }
            if order.status == OrderStatus::Pending {
                stats.pending += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProduct, OrderItem};
    use chrono::{TimeZone, Utc};

    fn product(name: &str, category: Category, description: &str) -> Product {
        NewProduct::new(name, Decimal::ONE)
            .with_category(category)
            .with_description(description)
            .into_product(1, Utc::now())
    }

    fn order(id: i64, day: u32, hour: u32, status: OrderStatus, total: i64) -> Order {
        Order::new(id, vec![OrderItem::new("Meal", 1, Decimal::new(total, 2))])
            .with_status(status)
            .with_created_at(Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap())
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_product_search_checks_description() {
        let products = vec![
            product("Tomato Soup", Category::Starters, ""),
            product("Lasagna", Category::MainCourses, "With tomato sauce"),
            product("Lemonade", Category::Drinks, "Fresh"),
        ];
        let filter = ProductFilter {
            search: Some("TOMATO".to_string()),
            category: None,
        };
        assert_eq!(filter.apply(&products).len(), 2);

        let filter = ProductFilter {
            search: Some("tomato".to_string()),
            category: Some(Category::Starters),
        };
        let found = filter.apply(&products);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Tomato Soup");
    }

    #[test]
    fn test_empty_product_filter_matches_all() {
        let products = vec![product("Soup", Category::Starters, "")];
        let filter = ProductFilter {
            search: Some("  ".to_string()),
            category: None,
        };
        assert_eq!(filter.apply(&products).len(), 1);
        assert_eq!(ProductFilter::default().apply(&products).len(), 1);
    }

    #[test]
    fn test_order_filter_by_status_and_date() {
        let orders = vec![
            order(1, 14, 9, OrderStatus::Pending, 1000),
            order(2, 14, 23, OrderStatus::Ready, 1000),
            order(3, 13, 12, OrderStatus::Pending, 1000),
        ];
        let filter = OrderFilter {
            status: Some(OrderStatus::Pending),
            date: Some(date(14)),
        };
        let ids: Vec<i64> = filter.apply(&orders).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1]);

        let filter = OrderFilter {
            status: None,
            date: Some(date(14)),
        };
        assert_eq!(filter.apply(&orders).len(), 2);
    }

    #[test]
    fn test_undated_orders_never_match_date() {
        let mut undated = order(1, 14, 9, OrderStatus::Pending, 1000);
        undated.created_at = None;
        let filter = OrderFilter {
            status: None,
            date: Some(date(14)),
        };
        assert!(!filter.matches(&undated));
        assert!(OrderFilter::default().matches(&undated));
    }

    #[test]
    fn test_dashboard_stats() {
        let orders = vec![
            order(1, 14, 9, OrderStatus::Pending, 2500),
            order(2, 14, 13, OrderStatus::Delivered, 1250),
            order(3, 13, 20, OrderStatus::Pending, 9900),
        ];
        let stats = DashboardStats::compute(&orders, date(14));
        assert_eq!(stats.orders_today, 2);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.revenue_today, Decimal::new(3750, 2));
    }

    #[test]
    fn test_dashboard_stats_empty() {
        assert_eq!(
            DashboardStats::compute(&[], date(1)),
            DashboardStats::default()
        );
    }
}
