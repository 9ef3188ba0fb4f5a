use crate::{
    error::{AppError, Result},
    models::OrderItemDetail,
};

pub fn ensure_positive_quantity(quantity: i32) -> Result<()> {
    if quantity < 1 {
        return Err(AppError::BadRequest(
            "Quantity must be at least 1.".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_stock(requested: i32, stock: i32) -> Result<()> {
    if requested > stock {
        return Err(AppError::BadRequest(
            "Not enough stock available.".to_string(),
        ));
    }
    Ok(())
}

/// Re-validates every cart line against the product as it is now.
pub fn validate_for_checkout(items: &[OrderItemDetail]) -> Result<()> {
    if items.is_empty() {
        return Err(AppError::BadRequest("Your cart is empty.".to_string()));
    }

    for item in items {
        if !item.product_is_active {
            return Err(AppError::BadRequest(format!(
                "Product '{}' is no longer available.",
                item.product_name
            )));
        }
        if item.quantity > item.product_stock {
            return Err(AppError::BadRequest(format!(
                "Not enough stock available for '{}': requested {}, available {}.",
                item.product_name, item.quantity, item.product_stock
            )));
        }
    }

    Ok(())
}
