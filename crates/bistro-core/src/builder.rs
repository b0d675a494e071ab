//! # Order Aggregate Builder
//!
//! Turns a submitted cart into a priced, typed set of order lines.
//!
//! ## Expansion
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart                              Order lines                          │
//! │  ────                              ───────────                          │
//! │  2 × Pommes            ──────────► simple     Pommes     2 × 5.50       │
//! │                                                                         │
//! │  1 × Burger Menu       ──────────► bundle     Burger Menu 1 × 14.00     │
//! │      Burger: Classic               ├ component Classic    1 × 0.00      │
//! │      Drink:  Cola                  └ component Cola       1 × 0.00      │
//! │                                                                         │
//! │  total = Σ simple + bundle subtotals = 25.00                           │
//! │  stock = simple + component lines (Pommes -2, Classic -1, Cola -1)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule is checked before anything is returned: one bad line rejects
//! the whole cart. The builder never persists; the engine owns that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    LineType, MenuSlot, Order, OrderLine, OrderOrigin, OrderStatus, Product, ProductKind,
};
use crate::validation::{
    validate_cart_size, validate_contact, validate_idempotency_key, validate_quantity,
};

// =============================================================================
// Catalog Lookup
// =============================================================================

/// Read access to the catalog as the builder needs it.
pub trait CatalogLookup {
    /// Looks up a product by id.
    fn product(&self, id: &str) -> Option<&Product>;

    /// Slots of a menu product, in `sequence` order.
    fn menu_slots(&self, menu_id: &str) -> &[MenuSlot];
}

/// In-memory catalog, filled from storage before a build.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<String, Product>,
    slots: HashMap<String, Vec<MenuSlot>>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    /// Registers the slots of a menu. They are kept sorted by sequence.
    pub fn insert_menu_slots(&mut self, menu_id: impl Into<String>, mut slots: Vec<MenuSlot>) {
        slots.sort_by_key(|slot| slot.sequence);
        self.slots.insert(menu_id.into(), slots);
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products.contains_key(product_id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl CatalogLookup for CatalogSnapshot {
    fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    fn menu_slots(&self, menu_id: &str) -> &[MenuSlot] {
        self.slots.get(menu_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// The option chosen for one menu slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SlotSelection {
    pub slot_id: String,
    pub option_product_id: String,
}

/// One line of a submitted cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    /// Slot choices; only valid for menu products.
    #[serde(default)]
    pub selections: Vec<SlotSelection>,
}

impl CartLine {
    /// A cart line for a simple product.
    pub fn simple(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
            selections: Vec::new(),
        }
    }

    /// A cart line for a menu with `(slot_id, option_product_id)` choices.
    pub fn menu<S, O>(product_id: impl Into<String>, quantity: i64, choices: Vec<(S, O)>) -> Self
    where
        S: Into<String>,
        O: Into<String>,
    {
        CartLine {
            product_id: product_id.into(),
            quantity,
            selections: choices
                .into_iter()
                .map(|(slot_id, option)| SlotSelection {
                    slot_id: slot_id.into(),
                    option_product_id: option.into(),
                })
                .collect(),
        }
    }
}

/// A checkout request from the storefront or the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderRequest {
    pub customer_id: Option<String>,
    pub contact_email: Option<String>,
    pub origin: OrderOrigin,
    /// Checkout attempt id; also the idempotency key for order creation.
    pub payment_attempt_id: Option<String>,
    pub lines: Vec<CartLine>,
}

impl OrderRequest {
    /// Every product id the request touches, options included.
    pub fn referenced_product_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let all = self.lines.iter().flat_map(|line| {
            std::iter::once(&line.product_id)
                .chain(line.selections.iter().map(|s| &s.option_product_id))
        });
        for id in all {
            if seen.insert(id.as_str()) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

// =============================================================================
// Draft
// =============================================================================

/// One stock-affecting line of a draft, as a signed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: String,
    pub order_line_id: String,
    /// Always `-quantity` for a sale.
    pub delta: i64,
}

/// A built but not yet persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderDraft {
    /// One sale movement per `simple` and `component` line.
    pub fn stock_movements(&self) -> Vec<StockMovement> {
        stock_movements(&self.lines)
    }

    /// Required quantity per product, summed across lines.
    pub fn stock_requirements(&self) -> BTreeMap<String, i64> {
        let mut required = BTreeMap::new();
        for movement in self.stock_movements() {
            *required.entry(movement.product_id).or_insert(0) += -movement.delta;
        }
        required
    }

    /// Σ subtotal over `simple` and `bundle` lines.
    pub fn line_total(&self) -> Money {
        order_total(&self.lines)
    }
}

/// Sale movements for persisted or drafted lines.
pub fn stock_movements(lines: &[OrderLine]) -> Vec<StockMovement> {
    lines
        .iter()
        .filter(|line| line.line_type.affects_stock())
        .map(|line| StockMovement {
            product_id: line.product_id.clone(),
            order_line_id: line.id.clone(),
            delta: -line.quantity,
        })
        .collect()
}

/// The order total implied by a set of lines.
pub fn order_total(lines: &[OrderLine]) -> Money {
    lines
        .iter()
        .filter(|line| line.line_type.contributes_to_total())
        .map(OrderLine::subtotal)
        .sum()
}

// =============================================================================
// Builder
// =============================================================================

/// Builds [`OrderDraft`]s against a catalog.
///
/// ## Example
/// ```rust
/// use bistro_core::builder::{CartLine, CatalogSnapshot, OrderBuilder, OrderRequest};
/// use bistro_core::types::OrderOrigin;
///
/// let catalog = CatalogSnapshot::new();
/// let request = OrderRequest {
///     customer_id: None,
///     contact_email: Some("guest@example.com".into()),
///     origin: OrderOrigin::Storefront,
///     payment_attempt_id: None,
///     lines: vec![CartLine::simple("missing", 1)],
/// };
/// assert!(OrderBuilder::new(&catalog).build(&request).is_err());
/// ```
pub struct OrderBuilder<'a, C: CatalogLookup + ?Sized> {
    catalog: &'a C,
    now: DateTime<Utc>,
}

impl<'a, C: CatalogLookup + ?Sized> OrderBuilder<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        OrderBuilder {
            catalog,
            now: Utc::now(),
        }
    }

    /// Overrides the creation timestamp.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Validates the request and expands it into order lines.
    pub fn build(&self, request: &OrderRequest) -> CoreResult<OrderDraft> {
        validate_contact(
            request.customer_id.as_deref(),
            request.contact_email.as_deref(),
        )?;
        validate_cart_size(request.lines.len())?;
        if let Some(attempt_id) = &request.payment_attempt_id {
            validate_idempotency_key(attempt_id)?;
        }
        for line in &request.lines {
            validate_quantity(line.quantity)?;
        }

        let order_id = Uuid::new_v4().to_string();
        let mut lines = Vec::new();
        for cart_line in &request.lines {
            self.expand_line(&order_id, cart_line, &mut lines)?;
        }

        let total = checked_total(&lines)?;

        let order = Order {
            id: order_id,
            customer_id: trimmed(request.customer_id.as_deref()),
            contact_email: trimmed(request.contact_email.as_deref()),
            total_cents: total.cents(),
            status: OrderStatus::Pending,
            origin: request.origin,
            payment_attempt_id: request.payment_attempt_id.clone(),
            created_at: self.now,
            updated_at: self.now,
        };

        Ok(OrderDraft { order, lines })
    }

    fn expand_line(
        &self,
        order_id: &str,
        cart_line: &CartLine,
        out: &mut Vec<OrderLine>,
    ) -> CoreResult<()> {
        let product = self.sellable(&cart_line.product_id)?;

        match product.kind {
            ProductKind::Simple => {
                if !cart_line.selections.is_empty() {
                    return Err(CoreError::invalid_selection(
                        &product.id,
                        "selections given for a product that is not a menu",
                    ));
                }
                out.push(self.line(order_id, LineType::Simple, product, cart_line.quantity));
            }
            ProductKind::Menu => {
                let components = self.resolve_slots(product, &cart_line.selections)?;
                let bundle = self.line(order_id, LineType::Bundle, product, cart_line.quantity);
                let bundle_id = bundle.id.clone();
                out.push(bundle);

                for (slot, option) in components {
                    let mut component =
                        self.line(order_id, LineType::Component, option, cart_line.quantity);
                    component.unit_price_cents = 0;
                    component.parent_line_id = Some(bundle_id.clone());
                    component.menu_slot_id = Some(slot.id.clone());
                    component.slot_name = Some(slot.name.clone());
                    out.push(component);
                }
            }
        }

        Ok(())
    }

    /// Matches selections to slots. Returns `(slot, option)` in slot order.
    fn resolve_slots<'p>(
        &'p self,
        menu: &Product,
        selections: &[SlotSelection],
    ) -> CoreResult<Vec<(&'p MenuSlot, &'p Product)>> {
        let slots = self.catalog.menu_slots(&menu.id);

        let mut chosen: HashMap<&str, &str> = HashMap::new();
        for selection in selections {
            if !slots.iter().any(|slot| slot.id == selection.slot_id) {
                return Err(CoreError::invalid_selection(
                    &menu.id,
                    format!("unknown slot '{}'", selection.slot_id),
                ));
            }
            if chosen
                .insert(&selection.slot_id, &selection.option_product_id)
                .is_some()
            {
                return Err(CoreError::invalid_selection(
                    &menu.id,
                    format!("slot '{}' selected more than once", selection.slot_id),
                ));
            }
        }

        let mut ordered: Vec<&MenuSlot> = slots.iter().collect();
        ordered.sort_by_key(|slot| slot.sequence);

        let mut resolved = Vec::with_capacity(ordered.len());
        for slot in ordered {
            let option_id = chosen.get(slot.id.as_str()).ok_or_else(|| {
                CoreError::invalid_selection(
                    &menu.id,
                    format!("slot '{}' has no selection", slot.name),
                )
            })?;
            if !slot.is_eligible(option_id) {
                return Err(CoreError::invalid_selection(
                    &menu.id,
                    format!("'{}' is not an option for slot '{}'", option_id, slot.name),
                ));
            }
            let option = self.sellable(option_id)?;
            resolved.push((slot, option));
        }

        Ok(resolved)
    }

    /// Looks up a product that exists and is active.
    fn sellable(&self, product_id: &str) -> CoreResult<&'a Product> {
        let product = self
            .catalog
            .product(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        if !product.is_active {
            return Err(CoreError::invalid_selection(product_id, "product is inactive"));
        }
        Ok(product)
    }

    fn line(
        &self,
        order_id: &str,
        line_type: LineType,
        product: &Product,
        quantity: i64,
    ) -> OrderLine {
        OrderLine {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            line_type,
            product_id: product.id.clone(),
            title: product.name.clone(),
            quantity,
            unit_price_cents: product.price_cents,
            parent_line_id: None,
            menu_slot_id: None,
            slot_name: None,
            created_at: self.now,
        }
    }
}

fn checked_total(lines: &[OrderLine]) -> CoreResult<Money> {
    let overflow = || ValidationError::OutOfRange {
        field: "order total".to_string(),
        min: 0,
        max: i64::MAX,
    };
    let mut total = Money::zero();
    for line in lines.iter().filter(|l| l.line_type.contributes_to_total()) {
        let subtotal = line
            .unit_price()
            .checked_multiply_quantity(line.quantity)
            .ok_or_else(overflow)?;
        total = total.checked_add(subtotal).ok_or_else(overflow)?;
    }
    Ok(total)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, kind: ProductKind, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot(id: &str, name: &str, sequence: i64, options: &[&str]) -> MenuSlot {
        MenuSlot {
            id: id.to_string(),
            menu_product_id: "menu".to_string(),
            name: name.to_string(),
            sequence,
            option_product_ids: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Menu with slots Burger {a, b} and Drink {c, d}, plus Pommes.
    fn catalog() -> CatalogSnapshot {
        let mut catalog = CatalogSnapshot::new();
        catalog.insert_product(product("pommes", ProductKind::Simple, 550));
        catalog.insert_product(product("menu", ProductKind::Menu, 1400));
        for id in ["a", "b", "c", "d"] {
            catalog.insert_product(product(id, ProductKind::Simple, 900));
        }
        // inserted out of order on purpose
        catalog.insert_menu_slots(
            "menu",
            vec![
                slot("slot-drink", "Drink", 2, &["c", "d"]),
                slot("slot-burger", "Burger", 1, &["a", "b"]),
            ],
        );
        catalog
    }

    fn request(lines: Vec<CartLine>) -> OrderRequest {
        OrderRequest {
            customer_id: None,
            contact_email: Some("guest@example.com".to_string()),
            origin: OrderOrigin::Storefront,
            payment_attempt_id: Some("attempt-1".to_string()),
            lines,
        }
    }

    #[test]
    fn test_simple_line() {
        let catalog = catalog();
        let draft = OrderBuilder::new(&catalog)
            .build(&request(vec![CartLine::simple("pommes", 2)]))
            .unwrap();

        assert_eq!(draft.lines.len(), 1);
        let line = &draft.lines[0];
        assert_eq!(line.line_type, LineType::Simple);
        assert_eq!(line.title, "POMMES");
        assert_eq!(line.unit_price_cents, 550);
        assert_eq!(draft.order.total_cents, 1100);
        assert_eq!(draft.order.status, OrderStatus::Pending);
        assert_eq!(draft.order.payment_attempt_id.as_deref(), Some("attempt-1"));
    }

    #[test]
    fn test_menu_expands_in_slot_order() {
        let catalog = catalog();
        let cart = CartLine::menu("menu", 2, vec![("slot-drink", "d"), ("slot-burger", "a")]);
        let draft = OrderBuilder::new(&catalog).build(&request(vec![cart])).unwrap();

        let types: Vec<_> = draft.lines.iter().map(|l| l.line_type).collect();
        assert_eq!(
            types,
            vec![LineType::Bundle, LineType::Component, LineType::Component]
        );

        let bundle = &draft.lines[0];
        assert_eq!(bundle.unit_price_cents, 1400);

        let burger = &draft.lines[1];
        assert_eq!(burger.product_id, "a");
        assert_eq!(burger.slot_name.as_deref(), Some("Burger"));
        assert_eq!(burger.unit_price_cents, 0);
        assert_eq!(burger.quantity, 2);
        assert_eq!(burger.parent_line_id.as_deref(), Some(bundle.id.as_str()));

        let drink = &draft.lines[2];
        assert_eq!(drink.product_id, "d");
        assert_eq!(drink.menu_slot_id.as_deref(), Some("slot-drink"));

        assert_eq!(draft.order.total_cents, 2800);
    }

    #[test]
    fn test_total_matches_lines_and_components_are_free() {
        let catalog = catalog();
        let draft = OrderBuilder::new(&catalog)
            .build(&request(vec![
                CartLine::simple("pommes", 3),
                CartLine::menu("menu", 1, vec![("slot-burger", "b"), ("slot-drink", "c")]),
                CartLine::simple("a", 1),
            ]))
            .unwrap();

        assert_eq!(draft.order.total(), draft.line_total());
        assert_eq!(draft.order.total_cents, 3 * 550 + 1400 + 900);
        assert!(draft
            .lines
            .iter()
            .filter(|l| l.line_type == LineType::Component)
            .all(|l| l.unit_price_cents == 0));
    }

    #[test]
    fn test_ineligible_option_rejected() {
        let catalog = catalog();
        let cart = CartLine::menu("menu", 1, vec![("slot-burger", "c"), ("slot-drink", "d")]);
        let err = OrderBuilder::new(&catalog).build(&request(vec![cart])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSelection { .. }));
    }

    #[test]
    fn test_missing_slot_rejected() {
        let catalog = catalog();
        let cart = CartLine::menu("menu", 1, vec![("slot-burger", "a")]);
        let err = OrderBuilder::new(&catalog).build(&request(vec![cart])).unwrap_err();
        match err {
            CoreError::InvalidSelection { reason, .. } => assert!(reason.contains("Drink")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_and_unknown_slots_rejected() {
        let catalog = catalog();
        let duplicate = CartLine::menu(
            "menu",
            1,
            vec![("slot-burger", "a"), ("slot-burger", "b"), ("slot-drink", "c")],
        );
        assert!(matches!(
            OrderBuilder::new(&catalog).build(&request(vec![duplicate])),
            Err(CoreError::InvalidSelection { .. })
        ));

        let unknown = CartLine::menu(
            "menu",
            1,
            vec![("slot-burger", "a"), ("slot-drink", "c"), ("slot-dessert", "d")],
        );
        assert!(matches!(
            OrderBuilder::new(&catalog).build(&request(vec![unknown])),
            Err(CoreError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn test_selections_on_simple_product_rejected() {
        let catalog = catalog();
        let cart = CartLine::menu("pommes", 1, vec![("slot-burger", "a")]);
        assert!(matches!(
            OrderBuilder::new(&catalog).build(&request(vec![cart])),
            Err(CoreError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn test_unknown_and_inactive_products() {
        let mut catalog = catalog();
        let err = OrderBuilder::new(&catalog)
            .build(&request(vec![CartLine::simple("ghost", 1)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(id) if id == "ghost"));

        let mut inactive = product("c", ProductKind::Simple, 900);
        inactive.is_active = false;
        catalog.insert_product(inactive);
        let cart = CartLine::menu("menu", 1, vec![("slot-burger", "a"), ("slot-drink", "c")]);
        assert!(matches!(
            OrderBuilder::new(&catalog).build(&request(vec![cart])),
            Err(CoreError::InvalidSelection { product_id, .. }) if product_id == "c"
        ));
    }

    #[test]
    fn test_whole_cart_validation() {
        let catalog = catalog();

        // one bad quantity rejects everything
        let err = OrderBuilder::new(&catalog)
            .build(&request(vec![
                CartLine::simple("pommes", 1),
                CartLine::simple("pommes", 1000),
            ]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        assert!(OrderBuilder::new(&catalog).build(&request(vec![])).is_err());

        let too_many = (0..101).map(|_| CartLine::simple("pommes", 1)).collect();
        assert!(OrderBuilder::new(&catalog).build(&request(too_many)).is_err());

        let mut both = request(vec![CartLine::simple("pommes", 1)]);
        both.customer_id = Some("cust-1".to_string());
        assert!(matches!(
            OrderBuilder::new(&catalog).build(&both),
            Err(CoreError::Validation(ValidationError::ExactlyOne { .. }))
        ));
    }

    #[test]
    fn test_stock_movements_and_requirements() {
        let catalog = catalog();
        let draft = OrderBuilder::new(&catalog)
            .build(&request(vec![
                CartLine::simple("a", 1),
                CartLine::menu("menu", 2, vec![("slot-burger", "a"), ("slot-drink", "c")]),
            ]))
            .unwrap();

        let movements = draft.stock_movements();
        // simple a, component a, component c; never the bundle
        assert_eq!(movements.len(), 3);
        assert!(movements.iter().all(|m| m.product_id != "menu"));

        let required = draft.stock_requirements();
        assert_eq!(required.get("a"), Some(&3));
        assert_eq!(required.get("c"), Some(&2));
        assert_eq!(required.get("menu"), None);
    }

    #[test]
    fn test_referenced_product_ids() {
        let req = request(vec![
            CartLine::simple("pommes", 1),
            CartLine::menu("menu", 1, vec![("slot-burger", "a"), ("slot-drink", "c")]),
            CartLine::simple("pommes", 2),
        ]);
        assert_eq!(req.referenced_product_ids(), vec!["pommes", "menu", "a", "c"]);
    }
}
