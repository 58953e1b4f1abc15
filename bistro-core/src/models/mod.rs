mod order;
mod product;

pub use order::{Order, OrderItem, OrderStatus};
pub use product::{Category, NewProduct, Product, ProductStatus};

pub(crate) use product::validate_fields;

/// Records identified by an integer id, the key used to find their sheet row.
pub trait Identified {
    fn id(&self) -> i64;
}

impl Identified for Product {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Identified for Order {
    fn id(&self) -> i64 {
        self.id
    }
}
