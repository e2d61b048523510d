//! 🧾 Order documents → normalized rows. The direct flight, no layover. 🔄✈️
//!
//! 🎬 COLD OPEN — INT. POS TERMINAL #7 — LUNCH RUSH
//!
//! Somebody orders a combo meal with a coupon. The terminal writes a JSON document to the
//! couch with the order info, the address, a product list, a meal-detail list and a
//! discount list. Nobody asks the terminal what types the fields should be. It improvises.
//!
//! This module reads that improvisation and produces one [`OrderRow`] plus its children.
//! No I/O. No clock reads either: the processing timestamp comes in via [`MappingContext`].
//!
//! ## Document shape 📐
//! ```text
//! { "_id", "_rev", "_deleted"?,
//!   "order": {
//!     "orderInfo":      { "orderid", "userid", "totalamount", "addtime", ... },
//!     "addressInfo":    { "addressid", "addressname", ... },
//!     "productList":    [ { "productid", "productnum", "ismeat", ... } ],
//!     "mealDetailList": [ { "mealid", "mealprice", ... } ],
//!     "discountList":   [ { "discountid", "maketingcosts", ... } ] } }
//! ```
//!
//! ## Rules 📜
//! - Identity is `order.orderInfo.orderid`. Empty or missing → malformed, unless the change
//!   is a deletion, in which case the top-level `orderId` and then the change's document id
//!   stand in (tombstones only carry `_id`, `_rev` and `_deleted`).
//! - Parent `maketingCosts` comes from the first discount; `addressName` from `addressInfo`.
//! - Children inherit order id, store id, company id, address id and add time from the parent.
//! - Children's `createTime` is the processing timestamp; `updateTime` stays unset.
//!
//! 🦆

use serde_json::Value;

use crate::common::Change;
use crate::errors::SyncError;
use crate::rows::{ComboItemRow, DiscountRow, LineItemRow, NormalizedOrder, OrderRow};
use crate::transforms::lenient::{Fields, Reason};
use crate::transforms::{DocumentMapper, MappedDocument, MappingContext};

/// 🧾 Zero-sized marker for the POS order document format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderDocument;

impl DocumentMapper for OrderDocument {
    fn map_change(change: &Change, context: &MappingContext) -> Result<MappedDocument, SyncError> {
        let malformed = |reason: Reason| SyncError::MalformedDocument {
            document_id: change.document_id.clone(),
            reason,
        };

        let Some(the_body) = change.body.as_deref() else {
            if change.deleted {
                return Ok(tombstone(&change.document_id));
            }
            return Err(malformed("the feed delivered no document body".to_string()));
        };

        let the_json: Value = serde_json::from_str(the_body)
            .map_err(|e| malformed(format!("document body is not valid JSON: {e}")))?;
        let the_doc = Fields::of(Some(&the_json), "doc").map_err(malformed)?;
        let deleted = change.deleted || the_doc.flag("_deleted");

        if deleted {
            // -- 🪦 a tombstone only needs to say who died. the rest of its fields are none of our business.
            let the_identity = the_doc
                .object("order", "order")
                .and_then(|order| order.object("orderInfo", "order.orderInfo"))
                .map(|info| info.identity("orderid"))
                .unwrap_or_default();
            let the_identity = [the_identity, the_doc.identity("orderId")]
                .into_iter()
                .find(|id| !id.trim().is_empty())
                .unwrap_or_else(|| change.document_id.clone());
            return Ok(tombstone(&the_identity));
        }

        let order = map_order(the_doc, context).map_err(malformed)?;
        Ok(MappedDocument {
            deleted: false,
            order,
        })
    }
}

fn tombstone(order_id: &str) -> MappedDocument {
    MappedDocument {
        deleted: true,
        order: NormalizedOrder {
            order: OrderRow {
                order_id: order_id.to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

fn map_order(doc: Fields<'_>, context: &MappingContext) -> Result<NormalizedOrder, Reason> {
    let order = doc.object("order", "order")?;
    let info = order.object("orderInfo", "order.orderInfo")?;
    let address = order.object("addressInfo", "order.addressInfo")?;

    let order_id = info.identity("orderid");
    if order_id.trim().is_empty() {
        return Err("order.orderInfo.orderid is missing or empty".to_string());
    }

    let products = order.list("productList")?;
    let meals = order.list("mealDetailList")?;
    let discounts = order.list("discountList")?;

    let parent = ParentContext {
        order_id: order_id.clone(),
        store_id: info.identity("storeid"),
        company_id: info.identity("companyid"),
        address_id: address.identity("addressid"),
        add_time: info.time("addtime")?,
        processed_at: context.processed_at,
    };

    let the_discounts = discounts
        .iter()
        .map(|d| map_discount(d, &parent))
        .collect::<Result<Vec<_>, _>>()?;
    let the_line_items = products
        .iter()
        .map(|p| map_line_item(p, &parent))
        .collect::<Result<Vec<_>, _>>()?;
    let the_combo_items = meals
        .iter()
        .map(|m| map_combo_item(m, &parent))
        .collect::<Result<Vec<_>, _>>()?;

    let the_order = OrderRow {
        order_id,
        user_id: info.identity("userid"),
        user_name: info.text("username")?,
        user_phone: info.text("userphone")?,
        total_amount: info.int("totalamount")?,
        dicount_amount: info.int("dicountamount")?,
        pay_amount: info.int("payamount")?,
        freight: info.int("freight")?,
        nums: info.int("nums")?,
        store_id: parent.store_id.clone(),
        store_name: info.text("storename")?,
        order_status: info.int("orderstatus")?,
        order_trade_no: info.identity("ordertradeno"),
        order_third_no: info.identity("orderthirdno"),
        order_post_no: info.text("orderpostno")?,
        order_source: info.text("ordersource")?,
        order_platform_source: info.text("orderplatformsource")?,
        pay_type: info.text("paytype")?,
        maketing_costs: match discounts.first() {
            Some(first) => first.text("maketingcosts")?,
            None => String::new(),
        },
        delivery_way: info.lenient_int("deliveryway"),
        is_need_invoice: info.int("isneedinvoice")?,
        invoice_title: info.text("invoicetitle")?,
        ext: info.text("ext")?,
        book_time: info.time("booktime")?,
        add_time: parent.add_time,
        pay_time: info.time("paytime")?,
        delivery_time: info.time("deliverytime")?,
        receive_time: info.time("receivetime")?,
        return_time: info.time("returntime")?,
        meals_time: info.time("mealstime")?,
        cancel_time: info.time("canceltime")?,
        company_id: info.lenient_int("companyid"),
        company_name: info.text("companyname")?,
        identifying_code: info.lenient_int("identifyingcode"),
        pay_status: info.int("paystatus")?,
        address_lng: info.text("addresslng")?,
        address_lat: info.text("addresslat")?,
        add_order_operator: info.text("addorderoperator")?,
        cancel_order_operator: info.text("cancelorderoperator")?,
        is_take_out: info.int("istakeout")?,
        address_name: address.text("addressname")?,
        need_delivery: info.int("needdelivery")?,
        ..Default::default()
    };

    Ok(NormalizedOrder {
        order: the_order,
        line_items: the_line_items,
        combo_items: the_combo_items,
        discounts: the_discounts,
    })
}

/// 👨‍👧 What every child row inherits from its parent.
struct ParentContext {
    order_id: String,
    store_id: String,
    company_id: String,
    address_id: String,
    add_time: crate::rows::OcTime,
    processed_at: crate::rows::OcTime,
}

fn map_line_item(product: &Fields<'_>, parent: &ParentContext) -> Result<LineItemRow, Reason> {
    Ok(LineItemRow {
        order_id: parent.order_id.clone(),
        store_id: parent.store_id.clone(),
        company_id: parent.company_id.clone(),
        address_id: parent.address_id.clone(),
        product_id: product.identity("productid"),
        product_name: product.identity("productname"),
        product_num: product.int("productnum")?,
        total_price: product.int("totalprice")?,
        product_price: product.int("productprice")?,
        product_img: product.text("productimg")?,
        sales_area: product.text("salesarea")?,
        create_time: parent.processed_at,
        add_time: parent.add_time,
        is_meat: product.int("ismeat")?,
        meal_item_id: product.identity("mealitemid"),
        ..Default::default()
    })
}

fn map_combo_item(meal: &Fields<'_>, parent: &ParentContext) -> Result<ComboItemRow, Reason> {
    Ok(ComboItemRow {
        order_id: parent.order_id.clone(),
        store_id: parent.store_id.clone(),
        meal_id: meal.identity("mealid"),
        meal_type: meal.text("mealtype")?,
        meal_price: meal.int("mealprice")?,
        product_id: meal.identity("productid"),
        product_name: meal.identity("productname"),
        product_num: meal.int("productnum")?,
        total_price: meal.int("totalprice")?,
        product_price: meal.int("productprice")?,
        product_img: meal.text("productimg")?,
        sales_area: meal.text("salesarea")?,
        create_time: parent.processed_at,
        add_time: parent.add_time,
        meal_item_id: meal.identity("mealitemid"),
        ..Default::default()
    })
}

fn map_discount(discount: &Fields<'_>, parent: &ParentContext) -> Result<DiscountRow, Reason> {
    Ok(DiscountRow {
        order_id: parent.order_id.clone(),
        discount_id: discount.lenient_int("discountid"),
        discount_price: discount.int("discountprice")?,
        discount_num: discount.int("discountnum")?,
        discount_name: discount.text("discountname")?,
        discount_type: discount.text("discounttype")?,
        discount_amount: discount.int("discountamount")?,
        create_time: parent.processed_at,
        sales_area: discount.text("salesarea")?,
        maketing_costs: discount.text("maketingcosts")?,
        product_id: discount.lenient_int("productid"),
        discount_ext: discount.text("discountext")?,
        maketing_costs_id: discount.lenient_int("maketingcostsid"),
        ..Default::default()
    })
}
