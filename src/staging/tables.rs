//! Staging table names read by the warehouse loaders

pub const CUSTOMERS: &str = "stage_customers";
pub const PERSONS: &str = "stage_persons";
pub const PRODUCTS: &str = "stage_products";
pub const SUBCATEGORIES: &str = "stage_subcategories";
pub const CATEGORIES: &str = "stage_categories";
pub const TERRITORIES: &str = "stage_territories";
pub const SALESPERSONS: &str = "stage_salespersons";
pub const EMPLOYEES: &str = "stage_employees";
pub const OFFERS: &str = "stage_offers";
pub const ORDER_HEADERS: &str = "stage_order_headers";
pub const ORDER_DETAILS: &str = "stage_order_details";

/// Every staging table some dimension or the fact load reads
pub const REQUIRED: &[&str] = &[
    CUSTOMERS,
    PERSONS,
    PRODUCTS,
    SUBCATEGORIES,
    CATEGORIES,
    TERRITORIES,
    SALESPERSONS,
    EMPLOYEES,
    OFFERS,
    ORDER_HEADERS,
    ORDER_DETAILS,
];
