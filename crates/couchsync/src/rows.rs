//! 🗃️ Rows — the relational shapes an order gets flattened into.
//!
//! 🎬 COLD OPEN — INT. FILING CABINET — FOREVER
//!
//! A JSON document walks into a relational database. The bartender says "we don't serve
//! your kind here, you'll have to be split into four tables first." The document sighs.
//! It has done this before. It will do it again. Every time someone edits an order. 🦆
//!
//! Each row type carries its table name and its column list as static metadata via
//! [`TableRow`]. The statement builder reads that metadata and nothing else. No runtime
//! type introspection, no derive magic, just a macro that writes the boring parts once.

use std::fmt;

use chrono::{Local, NaiveDateTime, Timelike};

/// 🕰️ The wire format for every timestamp the POS terminals send us.
pub const OC_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 🕰️ A wall-clock timestamp that may be unset.
///
/// The source sends `"2019-03-07 12:00:00"`, or `""`, or `"null"`, or JSON null, and the
/// last three all mean "nobody filled this in". [`OcTime::is_set`] tells them apart from
/// every real instant, including midnight on 0001-01-01 if some terminal ever gets creative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OcTime(Option<NaiveDateTime>);

impl OcTime {
    pub const UNSET: OcTime = OcTime(None);

    pub fn from_datetime(instant: NaiveDateTime) -> Self {
        Self(Some(instant))
    }

    /// ⏰ Local wall-clock now, truncated to whole seconds like everything else in the tables.
    pub fn now() -> Self {
        let the_now = Local::now().naive_local();
        Self(the_now.with_nanosecond(0).or(Some(the_now)))
    }

    /// 🔍 Parse the `YYYY-MM-DD HH:MM:SS` wire format. `""` and `"null"` are the unset sentinel.
    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        let the_trimmed = raw.trim();
        if the_trimmed.is_empty() || the_trimmed == "null" {
            return Ok(Self::UNSET);
        }
        NaiveDateTime::parse_from_str(the_trimmed, OC_TIME_FORMAT).map(Self::from_datetime)
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn instant(&self) -> Option<NaiveDateTime> {
        self.0
    }
}

impl fmt::Display for OcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(instant) => write!(f, "{}", instant.format(OC_TIME_FORMAT)),
            None => write!(f, "<unset>"),
        }
    }
}

/// 🧱 The only three value shapes a column is allowed to have.
///
/// Anything fancier (nested objects, arrays, floats) never makes it past the mapper,
/// so "unsupported value shape" is a compile error here rather than a runtime panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Time(OcTime),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<OcTime> for SqlValue {
    fn from(value: OcTime) -> Self {
        SqlValue::Time(value)
    }
}

/// 📐 Static per-entity metadata: which table, which columns, in which order.
pub trait TableRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// 📦 Column values, aligned index-for-index with [`TableRow::COLUMNS`].
    fn values(&self) -> Vec<SqlValue>;

    /// 🔗 `(column, value)` pairs, for callers who'd rather not zip by hand.
    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        Self::COLUMNS.iter().copied().zip(self.values()).collect()
    }
}

// -- 🏭 one macro, four tables. field name, rust type, column name. that's the whole contract.
macro_rules! table_row {
    (
        $(#[$meta:meta])*
        $name:ident => $table:literal {
            $( $field:ident : $ty:ty => $column:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl TableRow for $name {
            const TABLE: &'static str = $table;
            const COLUMNS: &'static [&'static str] = &[$( $column ),*];

            fn values(&self) -> Vec<SqlValue> {
                vec![$( SqlValue::from(self.$field.clone()) ),*]
            }
        }
    };
}

table_row! {
    /// 🧾 One row of `order_master`, keyed by `orderId`. The parent of everything.
    OrderRow => "order_master" {
        order_id: String => "orderId",
        user_id: String => "userId",
        user_name: String => "userName",
        user_phone: String => "userPhone",
        total_amount: i64 => "totalAmount",
        // -- sic. the column has been misspelled since before any of us got here
        dicount_amount: i64 => "dicountAmount",
        pay_amount: i64 => "payAmount",
        freight: i64 => "freight",
        nums: i64 => "nums",
        store_id: String => "storeId",
        store_name: String => "storeName",
        order_status: i64 => "orderStatus",
        order_trade_no: String => "orderTradeNo",
        order_third_no: String => "orderThirdNo",
        order_post_no: String => "orderPostNo",
        order_source: String => "orderSource",
        order_platform_source: String => "orderPlatformSource",
        pay_type: String => "payType",
        maketing_costs: String => "maketingCosts",
        is_post: i64 => "isPost",
        delivery_id: String => "deliveryId",
        delivery_way: i64 => "deliveryWay",
        delivery_man: String => "deliveryMan",
        delivery_man_phone: String => "deliveryManPhone",
        is_need_invoice: i64 => "isNeedInvoice",
        invoice_title: String => "invoiceTitle",
        ext: String => "ext",
        book_time: OcTime => "bookTime",
        add_time: OcTime => "addTime",
        pay_time: OcTime => "payTime",
        delivery_time: OcTime => "deliveryTime",
        receive_time: OcTime => "receiveTime",
        return_time: OcTime => "returnTime",
        meals_time: OcTime => "mealsTime",
        cancel_time: OcTime => "cancelTime",
        reach_time: OcTime => "reachTime",
        company_id: i64 => "companyId",
        company_name: String => "companyName",
        is_filing: i64 => "isFiling",
        expeditor_no: i64 => "expeditorNo",
        expeditor_name: String => "expeditorName",
        virtual_order_no: i64 => "virtualOrderNo",
        redund_status: i64 => "redundStatus",
        redund_check_status: i64 => "redundCheckStatus",
        identifying_code: i64 => "identifyingCode",
        is_change: i64 => "isChange",
        pay_status: i64 => "payStatus",
        address_lng: String => "addressLng",
        address_lat: String => "addressLat",
        add_order_operator: String => "addOrderOperator",
        cancel_order_operator: String => "cancelOrderOperator",
        is_take_out: i64 => "isTakeOut",
        address_name: String => "addressName",
        need_delivery: i64 => "needDelivery",
    }
}

table_row! {
    /// 🍔 One row of `order_detail`: a product line on the receipt.
    LineItemRow => "order_detail" {
        order_id: String => "orderId",
        store_id: String => "storeId",
        company_id: String => "companyId",
        address_id: String => "addressId",
        product_id: String => "productId",
        product_name: String => "productName",
        product_num: i64 => "productNum",
        total_price: i64 => "totalPrice",
        product_price: i64 => "productPrice",
        product_img: String => "productImg",
        sales_area: String => "salesArea",
        create_time: OcTime => "createTime",
        update_time: OcTime => "updateTime",
        add_time: OcTime => "addTime",
        is_meat: i64 => "isMeat",
        product_detail: String => "productDetail",
        brand_id: String => "brandId",
        meal_item_id: String => "mealItemId",
    }
}

table_row! {
    /// 🍟 One row of `order_meal_detail`: a component of a combo meal.
    ComboItemRow => "order_meal_detail" {
        order_id: String => "orderId",
        store_id: String => "storeId",
        meal_id: String => "mealId",
        meal_type: String => "mealType",
        meal_price: i64 => "mealPrice",
        product_id: String => "productId",
        product_name: String => "productName",
        product_num: i64 => "productNum",
        total_price: i64 => "totalPrice",
        product_price: i64 => "productPrice",
        product_img: String => "productImg",
        sales_area: String => "salesArea",
        create_time: OcTime => "createTime",
        update_time: OcTime => "updateTime",
        add_time: OcTime => "addTime",
        brand_id: String => "brandId",
        meal_item_id: String => "mealItemId",
    }
}

table_row! {
    /// 🏷️ One row of `order_discount`.
    DiscountRow => "order_discount" {
        order_id: String => "orderId",
        discount_id: i64 => "discountId",
        discount_price: i64 => "discountPrice",
        discount_num: i64 => "discountNum",
        discount_name: String => "discountName",
        discount_type: String => "discountType",
        discount_amount: i64 => "discountAmount",
        create_time: OcTime => "createTime",
        update_time: OcTime => "updateTime",
        sales_area: String => "salesArea",
        maketing_costs: String => "maketingCosts",
        product_id: i64 => "productId",
        discount_ext: String => "discountExt",
        maketing_costs_id: i64 => "maketingCostsId",
    }
}

/// 👶 A child table row. The table also has a surrogate `id` column the sink assigns, and
/// `createTime` records the first time the row was written, not the latest.
pub trait ChildRow: TableRow + Clone {
    /// 🪪 The sink-assigned key. Not part of [`TableRow::COLUMNS`], never inserted by us.
    const SURROGATE_KEY: &'static str = "id";

    fn with_create_time(&self, create_time: OcTime) -> Self;
}

// -- all three children spell it `create_time`. one impl, three stamps.
macro_rules! child_row {
    ($($name:ident),* $(,)?) => {
        $(
            impl ChildRow for $name {
                fn with_create_time(&self, create_time: OcTime) -> Self {
                    Self {
                        create_time,
                        ..self.clone()
                    }
                }
            }
        )*
    };
}

child_row!(LineItemRow, ComboItemRow, DiscountRow);

/// 📦 One document, flattened: the parent row and its three families of children.
///
/// Every child's `order_id` equals `order.order_id`. The mapper guarantees it,
/// the tests check it, and the statement planner relies on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOrder {
    pub order: OrderRow,
    pub line_items: Vec<LineItemRow>,
    pub combo_items: Vec<ComboItemRow>,
    pub discounts: Vec<DiscountRow>,
}

impl NormalizedOrder {
    pub fn order_id(&self) -> &str {
        &self.order.order_id
    }

    /// 🧮 Total number of rows this order occupies across all four tables.
    pub fn row_count(&self) -> usize {
        1 + self.line_items.len() + self.combo_items.len() + self.discounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_empty_and_null_strings_mean_nobody_filled_it_in() {
        for the_void in ["", "null", "   "] {
            let the_time = OcTime::parse(the_void).expect("💀 the unset sentinel should parse");
            assert!(!the_time.is_set(), "💀 '{the_void}' should be unset");
        }
    }

    #[test]
    fn the_one_where_a_real_timestamp_survives_the_trip() {
        let the_time = OcTime::parse("2019-03-07 12:34:56").expect("💀 a real timestamp");
        assert!(the_time.is_set());
        assert_eq!(the_time.to_string(), "2019-03-07 12:34:56");

        // -- 🕳️ even the earliest representable instant is still "set"
        let the_dawn_of_time = OcTime::parse("0001-01-01 00:00:00").expect("💀 year one");
        assert!(the_dawn_of_time.is_set());
        assert_ne!(the_dawn_of_time, OcTime::UNSET);
    }

    #[test]
    fn the_one_where_garbage_timestamps_are_rejected() {
        assert!(OcTime::parse("last tuesday").is_err());
        assert!(OcTime::parse("2019-03-07T12:34:56Z").is_err());
    }

    #[test]
    fn the_one_where_now_is_set_and_has_no_fractional_seconds() {
        let the_now = OcTime::now();
        assert!(the_now.is_set());
        let the_instant = the_now.instant().expect("💀 now should be set");
        assert_eq!(the_instant.and_utc().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn the_one_where_columns_and_values_line_up() {
        let the_row = DiscountRow {
            order_id: "ord1".into(),
            discount_id: 7,
            ..Default::default()
        };
        let the_columns = the_row.columns();
        assert_eq!(the_columns.len(), DiscountRow::COLUMNS.len());
        assert_eq!(the_columns[0], ("orderId", SqlValue::Text("ord1".into())));
        assert_eq!(the_columns[1], ("discountId", SqlValue::Int(7)));
        assert_eq!(the_columns[7], ("createTime", SqlValue::Time(OcTime::UNSET)));
    }

    #[test]
    fn the_one_where_every_table_knows_its_name_and_width() {
        assert_eq!(OrderRow::TABLE, "order_master");
        assert_eq!(OrderRow::COLUMNS.len(), 54);
        assert_eq!(LineItemRow::TABLE, "order_detail");
        assert_eq!(LineItemRow::COLUMNS.len(), 18);
        assert_eq!(ComboItemRow::TABLE, "order_meal_detail");
        assert_eq!(ComboItemRow::COLUMNS.len(), 17);
        assert_eq!(DiscountRow::TABLE, "order_discount");
        assert_eq!(DiscountRow::COLUMNS.len(), 14);
        assert_eq!(OrderRow::default().values().len(), 54);
    }

    #[test]
    fn the_one_where_a_child_gets_its_birthday_back() {
        let the_birthday = OcTime::parse("2019-03-07 12:00:00").expect("💀 fixture time");
        let the_row = LineItemRow {
            order_id: "ord1".into(),
            create_time: OcTime::now(),
            ..Default::default()
        };
        let the_restamped = the_row.with_create_time(the_birthday);
        assert_eq!(the_restamped.create_time, the_birthday);
        assert_eq!(the_restamped.order_id, "ord1", "💀 everything else rides along untouched");
        assert_eq!(<DiscountRow as ChildRow>::SURROGATE_KEY, "id");
    }
}
