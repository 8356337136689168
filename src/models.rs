use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// An inventory record as stored and served by the API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Item {
    pub id: i32,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Client-supplied item fields for create and update requests.
/// The id is always assigned by storage, never by the client.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct ItemDraft {
    #[validate(
        length(min = 1, max = 255, message = "name must be between 1 and 255 characters"),
        custom(function = "name_not_blank")
    )]
    pub name: String,
    #[validate(range(min = 0, message = "quantity must be 0 or greater"))]
    pub quantity: i32,
    #[validate(custom(function = "price_not_negative"))]
    pub price: Decimal,
}

fn name_not_blank(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("not_blank");
        err.message = Some("name cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

fn price_not_negative(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("not_negative");
        err.message = Some("price must be 0 or greater".into());
        return Err(err);
    }
    Ok(())
}
