//! 🧱 Schema bootstrap — the `--init` hammer.
//!
//! Drops and recreates the four order tables and the audit table. Idempotent in the
//! "run it twice, get the same empty tables" sense, destructive in every other sense.
//! Only ever runs when someone types `--init` on purpose. 🦆
//!
//! MySQL gets the production layout (same column types and indexes the reporting queries
//! were written against). SQLite gets the same columns with SQLite's relaxed idea of types.

use anyhow::Result;

/// 🗣️ Which flavor of SQL the sink speaks. Data statements are identical in both (bound
/// `?` placeholders); only the `--init` DDL differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

/// 🔍 Table names get spliced into SQL text, so they had better be boring identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    let is_boring = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !is_boring {
        anyhow::bail!(
            "💀 '{name}' is not a table name we're willing to splice into SQL. Letters, digits, underscores, please."
        );
    }
    Ok(())
}

/// 📜 Every statement `--init` runs, in order.
pub fn bootstrap_statements(dialect: Dialect, audit_table: &str) -> Result<Vec<String>> {
    validate_identifier(audit_table)?;
    let the_statements = match dialect {
        Dialect::MySql => {
            let mut the_list: Vec<String> = vec![
                "SET NAMES utf8mb4".into(),
                "SET FOREIGN_KEY_CHECKS = 0".into(),
            ];
            for table in ["order_discount", "order_detail", "order_master", "order_meal_detail"] {
                the_list.push(format!("DROP TABLE IF EXISTS {table}"));
                the_list.push(mysql_table(table).to_string());
            }
            the_list.push(format!("DROP TABLE IF EXISTS {audit_table}"));
            the_list.push(mysql_audit_table(audit_table));
            the_list.push("SET FOREIGN_KEY_CHECKS = 1".into());
            the_list
        }
        Dialect::Sqlite => {
            let mut the_list = Vec::new();
            for table in ["order_discount", "order_detail", "order_master", "order_meal_detail"] {
                the_list.push(format!("DROP TABLE IF EXISTS {table}"));
                the_list.push(sqlite_table(table).to_string());
            }
            the_list.push(format!("DROP TABLE IF EXISTS {audit_table}"));
            the_list.push(sqlite_audit_table(audit_table));
            the_list
        }
    };
    Ok(the_statements)
}

fn mysql_audit_table(name: &str) -> String {
    format!(
        "CREATE TABLE {name} (
  id bigint NOT NULL,
  position varchar(2048) NOT NULL,
  documentId varchar(2048) DEFAULT NULL,
  outcome varchar(2048) DEFAULT NULL,
  timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
  PRIMARY KEY (id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    )
}

fn sqlite_audit_table(name: &str) -> String {
    format!(
        "CREATE TABLE {name} (
  id INTEGER NOT NULL PRIMARY KEY,
  position TEXT NOT NULL,
  documentId TEXT,
  outcome TEXT,
  timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)"
    )
}

fn mysql_table(table: &str) -> &'static str {
    match table {
        "order_discount" => MYSQL_ORDER_DISCOUNT,
        "order_detail" => MYSQL_ORDER_DETAIL,
        "order_master" => MYSQL_ORDER_MASTER,
        _ => MYSQL_ORDER_MEAL_DETAIL,
    }
}

fn sqlite_table(table: &str) -> &'static str {
    match table {
        "order_discount" => SQLITE_ORDER_DISCOUNT,
        "order_detail" => SQLITE_ORDER_DETAIL,
        "order_master" => SQLITE_ORDER_MASTER,
        _ => SQLITE_ORDER_MEAL_DETAIL,
    }
}

const MYSQL_ORDER_DISCOUNT: &str = "CREATE TABLE order_discount (
  id int(11) NOT NULL AUTO_INCREMENT,
  orderId varchar(50) NOT NULL,
  discountId int(11) DEFAULT NULL,
  discountPrice int(11) DEFAULT NULL,
  discountNum int(11) DEFAULT '0',
  discountName varchar(50) DEFAULT NULL,
  discountType varchar(50) DEFAULT NULL,
  discountAmount int(11) DEFAULT '0',
  createTime datetime DEFAULT NULL,
  updateTime datetime DEFAULT NULL,
  salesArea varchar(100) DEFAULT NULL,
  maketingCosts varchar(255) DEFAULT NULL,
  productId varchar(255) DEFAULT NULL,
  discountExt varchar(2000) DEFAULT NULL,
  maketingCostsId varchar(30) DEFAULT NULL,
  PRIMARY KEY (id),
  KEY discountId (discountId),
  KEY orderId (orderId),
  KEY productId (productId)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const MYSQL_ORDER_DETAIL: &str = "CREATE TABLE order_detail (
  id int(11) NOT NULL AUTO_INCREMENT,
  orderId varchar(50) NOT NULL,
  storeId varchar(50) DEFAULT NULL,
  companyId varchar(50) DEFAULT NULL,
  addressId varchar(11) DEFAULT NULL,
  productId varchar(20) DEFAULT NULL,
  productName varchar(255) DEFAULT NULL,
  productNum int(11) DEFAULT '0',
  totalPrice int(11) DEFAULT NULL,
  productPrice int(11) DEFAULT '0',
  productImg varchar(255) DEFAULT NULL,
  salesArea varchar(255) DEFAULT NULL,
  createTime datetime DEFAULT NULL,
  updateTime datetime DEFAULT NULL,
  addTime datetime DEFAULT NULL,
  isMeat int(2) DEFAULT '0',
  productDetail varchar(200) DEFAULT NULL,
  brandId varchar(50) DEFAULT NULL,
  mealItemId varchar(50) DEFAULT NULL,
  PRIMARY KEY (id),
  KEY detail_orderid (orderId) USING BTREE,
  KEY storeId (storeId),
  KEY addTime (addTime),
  KEY isMeat (isMeat)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const MYSQL_ORDER_MASTER: &str = "CREATE TABLE order_master (
  orderId varchar(50) NOT NULL,
  userId varchar(255) DEFAULT NULL,
  userName varchar(50) DEFAULT NULL,
  userPhone varchar(20) DEFAULT NULL,
  totalAmount int(11) DEFAULT '0',
  dicountAmount int(11) DEFAULT '0',
  payAmount int(11) DEFAULT '0',
  freight int(11) DEFAULT '0',
  nums int(11) DEFAULT '0',
  storeId varchar(255) DEFAULT NULL,
  storeName varchar(255) DEFAULT NULL,
  orderStatus int(2) DEFAULT NULL,
  orderTradeNo varchar(100) DEFAULT NULL,
  orderThirdNo varchar(100) DEFAULT NULL,
  orderPostNo varchar(100) DEFAULT NULL,
  orderSource varchar(20) DEFAULT NULL,
  orderPlatformSource varchar(20) DEFAULT NULL,
  payType varchar(100) DEFAULT NULL,
  maketingCosts varchar(255) DEFAULT NULL,
  isPost int(2) DEFAULT '0',
  deliveryId varchar(255) DEFAULT NULL,
  deliveryWay int(2) DEFAULT '0',
  deliveryMan varchar(255) DEFAULT NULL,
  deliveryManPhone varchar(255) DEFAULT NULL,
  isNeedInvoice int(2) DEFAULT '0',
  invoiceTitle varchar(255) DEFAULT NULL,
  ext varchar(2000) DEFAULT NULL,
  bookTime datetime DEFAULT NULL,
  addTime datetime DEFAULT NULL,
  payTime datetime DEFAULT NULL,
  deliveryTime datetime DEFAULT NULL,
  receiveTime datetime DEFAULT NULL,
  returnTime datetime DEFAULT NULL,
  companyId int(11) DEFAULT '0',
  companyName varchar(255) DEFAULT NULL,
  mealsTime datetime DEFAULT NULL,
  isFiling int(2) DEFAULT '0',
  cancelTime datetime DEFAULT NULL,
  expeditorNo varchar(255) DEFAULT NULL,
  expeditorName varchar(255) DEFAULT NULL,
  virtualOrderNo int(11) DEFAULT NULL,
  redundStatus int(2) DEFAULT NULL,
  redundCheckStatus int(2) DEFAULT NULL,
  identifyingCode varchar(10) DEFAULT NULL,
  isChange int(2) DEFAULT '0',
  payStatus int(2) DEFAULT '0',
  addressLng varchar(20) DEFAULT NULL,
  addressLat varchar(20) DEFAULT NULL,
  addOrderOperator varchar(20) DEFAULT NULL,
  cancelOrderOperator varchar(20) DEFAULT NULL,
  isTakeOut int(2) DEFAULT '0',
  addressName varchar(255) DEFAULT NULL,
  reachTime datetime DEFAULT NULL,
  needDelivery int(2) DEFAULT '1',
  PRIMARY KEY (orderId),
  KEY storeId (storeId),
  KEY addTime (addTime),
  KEY orderSource (orderSource),
  KEY needDelivery (needDelivery),
  KEY payStatus (payStatus),
  KEY payType (payType),
  KEY orderStatus (orderStatus),
  KEY isTakeOut (isTakeOut)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const MYSQL_ORDER_MEAL_DETAIL: &str = "CREATE TABLE order_meal_detail (
  id int(11) NOT NULL AUTO_INCREMENT,
  orderId varchar(50) NOT NULL,
  storeId varchar(50) DEFAULT NULL,
  mealId varchar(50) DEFAULT NULL,
  mealType varchar(50) DEFAULT NULL,
  mealPrice int(20) DEFAULT '0',
  productId varchar(11) DEFAULT NULL,
  productName varchar(255) DEFAULT NULL,
  productNum int(11) DEFAULT '0',
  totalPrice int(11) DEFAULT NULL,
  productPrice int(11) DEFAULT '0',
  productImg varchar(255) DEFAULT NULL,
  salesArea varchar(255) DEFAULT NULL,
  createTime datetime DEFAULT NULL,
  updateTime datetime DEFAULT NULL,
  addTime datetime DEFAULT NULL,
  brandId varchar(50) DEFAULT NULL,
  mealItemId varchar(50) DEFAULT NULL,
  PRIMARY KEY (id),
  KEY detail_orderid (orderId) USING BTREE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const SQLITE_ORDER_DISCOUNT: &str = "CREATE TABLE order_discount (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  orderId TEXT NOT NULL,
  discountId INTEGER,
  discountPrice INTEGER,
  discountNum INTEGER DEFAULT 0,
  discountName TEXT,
  discountType TEXT,
  discountAmount INTEGER DEFAULT 0,
  createTime TEXT,
  updateTime TEXT,
  salesArea TEXT,
  maketingCosts TEXT,
  productId TEXT,
  discountExt TEXT,
  maketingCostsId TEXT
)";

const SQLITE_ORDER_DETAIL: &str = "CREATE TABLE order_detail (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  orderId TEXT NOT NULL,
  storeId TEXT,
  companyId TEXT,
  addressId TEXT,
  productId TEXT,
  productName TEXT,
  productNum INTEGER DEFAULT 0,
  totalPrice INTEGER,
  productPrice INTEGER DEFAULT 0,
  productImg TEXT,
  salesArea TEXT,
  createTime TEXT,
  updateTime TEXT,
  addTime TEXT,
  isMeat INTEGER DEFAULT 0,
  productDetail TEXT,
  brandId TEXT,
  mealItemId TEXT
)";

const SQLITE_ORDER_MASTER: &str = "CREATE TABLE order_master (
  orderId TEXT NOT NULL PRIMARY KEY,
  userId TEXT,
  userName TEXT,
  userPhone TEXT,
  totalAmount INTEGER DEFAULT 0,
  dicountAmount INTEGER DEFAULT 0,
  payAmount INTEGER DEFAULT 0,
  freight INTEGER DEFAULT 0,
  nums INTEGER DEFAULT 0,
  storeId TEXT,
  storeName TEXT,
  orderStatus INTEGER,
  orderTradeNo TEXT,
  orderThirdNo TEXT,
  orderPostNo TEXT,
  orderSource TEXT,
  orderPlatformSource TEXT,
  payType TEXT,
  maketingCosts TEXT,
  isPost INTEGER DEFAULT 0,
  deliveryId TEXT,
  deliveryWay INTEGER DEFAULT 0,
  deliveryMan TEXT,
  deliveryManPhone TEXT,
  isNeedInvoice INTEGER DEFAULT 0,
  invoiceTitle TEXT,
  ext TEXT,
  bookTime TEXT,
  addTime TEXT,
  payTime TEXT,
  deliveryTime TEXT,
  receiveTime TEXT,
  returnTime TEXT,
  companyId INTEGER DEFAULT 0,
  companyName TEXT,
  mealsTime TEXT,
  isFiling INTEGER DEFAULT 0,
  cancelTime TEXT,
  expeditorNo TEXT,
  expeditorName TEXT,
  virtualOrderNo INTEGER,
  redundStatus INTEGER,
  redundCheckStatus INTEGER,
  identifyingCode TEXT,
  isChange INTEGER DEFAULT 0,
  payStatus INTEGER DEFAULT 0,
  addressLng TEXT,
  addressLat TEXT,
  addOrderOperator TEXT,
  cancelOrderOperator TEXT,
  isTakeOut INTEGER DEFAULT 0,
  addressName TEXT,
  reachTime TEXT,
  needDelivery INTEGER DEFAULT 1
)";

const SQLITE_ORDER_MEAL_DETAIL: &str = "CREATE TABLE order_meal_detail (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  orderId TEXT NOT NULL,
  storeId TEXT,
  mealId TEXT,
  mealType TEXT,
  mealPrice INTEGER DEFAULT 0,
  productId TEXT,
  productName TEXT,
  productNum INTEGER DEFAULT 0,
  totalPrice INTEGER,
  productPrice INTEGER DEFAULT 0,
  productImg TEXT,
  salesArea TEXT,
  createTime TEXT,
  updateTime TEXT,
  addTime TEXT,
  brandId TEXT,
  mealItemId TEXT
)";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{ComboItemRow, DiscountRow, LineItemRow, OrderRow, TableRow};

    #[test]
    fn the_one_where_boring_names_pass_and_clever_ones_dont() {
        assert!(validate_identifier("order_seq").is_ok());
        assert!(validate_identifier("OrderSeq2").is_ok());
        for the_clever_one in ["", "order seq", "seq; DROP TABLE order_master", "1seq", "séq"] {
            assert!(
                validate_identifier(the_clever_one).is_err(),
                "💀 '{the_clever_one}' should have been refused"
            );
        }
    }

    #[test]
    fn the_one_where_every_ddl_knows_every_column_the_builder_writes() {
        fn assert_covers<T: TableRow>(ddl: &str) {
            for column in T::COLUMNS {
                assert!(
                    ddl.contains(&format!("\n  {column} ")),
                    "💀 {} DDL is missing column {column}",
                    T::TABLE
                );
            }
        }
        for dialect in [Dialect::MySql, Dialect::Sqlite] {
            let the_script = bootstrap_statements(dialect, "order_seq")
                .expect("💀 order_seq is a fine name")
                .join("\n");
            assert_covers::<OrderRow>(&the_script);
            assert_covers::<LineItemRow>(&the_script);
            assert_covers::<ComboItemRow>(&the_script);
            assert_covers::<DiscountRow>(&the_script);
        }
    }

    #[test]
    fn the_one_where_every_table_is_dropped_before_it_is_created() {
        let the_script = bootstrap_statements(Dialect::Sqlite, "audit_log").expect("💀 fine name");
        for table in ["order_master", "order_detail", "order_meal_detail", "order_discount", "audit_log"] {
            let the_drop = the_script
                .iter()
                .position(|s| s == &format!("DROP TABLE IF EXISTS {table}"))
                .expect("💀 every table gets dropped");
            let the_create = the_script
                .iter()
                .position(|s| s.starts_with(&format!("CREATE TABLE {table} (")))
                .expect("💀 every table gets created");
            assert!(the_drop < the_create);
        }
        assert!(bootstrap_statements(Dialect::MySql, "bad name").is_err());
    }
}
