use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{GroupBy, ReportCell, ReportLine, ReportParams, ReportTable, ReportTotals};

#[derive(Default)]
struct Bucket {
    orders: HashSet<i32>,
    units: i64,
    revenue: Decimal,
}

impl Bucket {
    fn add(&mut self, line: &ReportLine) {
        self.orders.insert(line.order_id);
        self.units += i64::from(line.quantity);
        self.revenue += line_revenue(line);
    }
}

#[derive(Default)]
struct OrderRow {
    date: Option<NaiveDate>,
    customer: String,
    items: i64,
    total: Decimal,
}

fn line_revenue(line: &ReportLine) -> Decimal {
    line.price * Decimal::from(line.quantity)
}

pub fn report_title(group_by: GroupBy) -> &'static str {
    match group_by {
        GroupBy::None => "Reporte de ventas",
        GroupBy::Product => "Ventas por producto",
        GroupBy::Client => "Ventas por cliente",
        GroupBy::Category => "Ventas por categoría",
        GroupBy::Date => "Ventas por fecha",
    }
}

/// Aggregates completed order lines into the table shape for the requested grouping.
pub fn build_report(params: &ReportParams, lines: &[ReportLine]) -> ReportTable {
    let (headers, rows) = match params.group_by {
        GroupBy::None => by_order(lines),
        GroupBy::Product => by_key(lines, "Producto", |l| l.product_name.clone(), false),
        GroupBy::Category => by_key(lines, "Categoría", |l| l.category_name.clone(), false),
        GroupBy::Client => by_key(lines, "Cliente", |l| l.customer.clone(), true),
        GroupBy::Date => by_date(lines),
    };

    ReportTable {
        title: report_title(params.group_by).to_string(),
        period: params.period_text.clone(),
        headers: headers.into_iter().map(str::to_string).collect(),
        rows,
        totals: totals(lines),
    }
}

fn totals(lines: &[ReportLine]) -> ReportTotals {
    let mut bucket = Bucket::default();
    for line in lines {
        bucket.add(line);
    }

    ReportTotals {
        orders: bucket.orders.len() as i64,
        units: bucket.units,
        revenue: bucket.revenue,
    }
}

fn by_order(lines: &[ReportLine]) -> (Vec<&'static str>, Vec<Vec<ReportCell>>) {
    let mut orders: BTreeMap<i32, OrderRow> = BTreeMap::new();
    for line in lines {
        let row = orders.entry(line.order_id).or_default();
        row.date = Some(line.completed_at.date_naive());
        row.customer = line.customer.clone();
        row.items += i64::from(line.quantity);
        row.total += line_revenue(line);
    }

    let mut sorted: Vec<(i32, OrderRow)> = orders.into_iter().collect();
    sorted.sort_by(|(a_id, a), (b_id, b)| a.date.cmp(&b.date).then(a_id.cmp(b_id)));

    let rows = sorted
        .into_iter()
        .map(|(id, row)| {
            vec![
                ReportCell::Integer(i64::from(id)),
                ReportCell::Text(
                    row.date
                        .map(|d| d.format("%d/%m/%Y").to_string())
                        .unwrap_or_default(),
                ),
                ReportCell::Text(row.customer),
                ReportCell::Integer(row.items),
                ReportCell::Money(row.total),
            ]
        })
        .collect();

    (vec!["Pedido", "Fecha", "Cliente", "Artículos", "Total"], rows)
}

/// Groups by a text key, highest revenue first.
fn by_key<F>(
    lines: &[ReportLine],
    label: &'static str,
    key: F,
    with_orders: bool,
) -> (Vec<&'static str>, Vec<Vec<ReportCell>>)
where
    F: Fn(&ReportLine) -> String,
{
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    for line in lines {
        buckets.entry(key(line)).or_default().add(line);
    }

    let mut sorted: Vec<(String, Bucket)> = buckets.into_iter().collect();
    sorted.sort_by(|(a_key, a), (b_key, b)| b.revenue.cmp(&a.revenue).then(a_key.cmp(b_key)));

    let rows = sorted
        .into_iter()
        .map(|(name, bucket)| {
            let mut row = vec![ReportCell::Text(name)];
            if with_orders {
                row.push(ReportCell::Integer(bucket.orders.len() as i64));
            }
            row.push(ReportCell::Integer(bucket.units));
            row.push(ReportCell::Money(bucket.revenue));
            row
        })
        .collect();

    let headers = if with_orders {
        vec![label, "Pedidos", "Unidades", "Ingresos"]
    } else {
        vec![label, "Unidades", "Ingresos"]
    };

    (headers, rows)
}

fn by_date(lines: &[ReportLine]) -> (Vec<&'static str>, Vec<Vec<ReportCell>>) {
    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for line in lines {
        buckets
            .entry(line.completed_at.date_naive())
            .or_default()
            .add(line);
    }

    let rows = buckets
        .into_iter()
        .map(|(day, bucket)| {
            vec![
                ReportCell::Text(day.format("%d/%m/%Y").to_string()),
                ReportCell::Integer(bucket.orders.len() as i64),
                ReportCell::Integer(bucket.units),
                ReportCell::Money(bucket.revenue),
            ]
        })
        .collect();

    (vec!["Fecha", "Pedidos", "Unidades", "Ingresos"], rows)
}
