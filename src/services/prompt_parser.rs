//! Turns a free-text report prompt ("ventas de enero 2024 en excel") into
//! report parameters. Parsing never fails: anything it does not recognize
//! falls back to all-time, ungrouped, on-screen output, and the result says so
//! through `used_defaults`.
//!
//! Filters are pulled out first and their numbers blanked, so "entre 1500 y
//! 2000" is read as a price range and never as the year 2000.

use std::{ops::Range, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::{DateRange, GroupBy, ReportFilters, ReportFormat, ReportParams};

const MONTHS: [(&str, u32); 13] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

const MONTH_ALTERNATION: &str =
    "enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|setiembre|octubre|noviembre|diciembre";

/// Amount with an optional two-digit fraction, ended by a space, punctuation or the end.
const AMOUNT: &str = r"(\d+(?:[.,]\d{1,2})?)(?:[\s.,;!?)]|$)";

/// Words after "cliente"/"categoria" that are part of the sentence, not a name.
const NOT_A_NAME: [&str; 32] = [
    "que", "con", "del", "de", "el", "la", "los", "las", "en", "y", "o", "por", "para", "a",
    "al", "vip", "mas", "menos", "entre", "desde", "hasta", "este", "esta", "pdf", "excel",
    "xlsx", "xls", "pantalla", "mes", "ano", "ultimo", "ultimos",
];

/// Nouns that turn a number into a count instead of a price.
const UNIT_WORDS: [&str; 10] = [
    "dia", "dias", "unidad", "unidades", "producto", "productos", "item", "items", "meses",
    "anos",
];

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\s+(?:al?|hasta|to|-)\s+(?:el\s+)?(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})",
    )
    .expect("range pattern is valid")
});

static LAST_DAYS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:ultimos?|pasados?|last)\s+(\d{1,4})\s+(?:dias?|days?)\b")
        .expect("last days pattern is valid")
});

static BETWEEN_MONTHS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bentre\s+(?:(?:el\s+)?mes\s+de\s+)?({m})\s+y\s+(?:el\s+mes\s+de\s+)?({m})(?:\s+(?:de|del))?(?:\s+ano)?(?:\s+(\d{{4}}))?\b",
        m = MONTH_ALTERNATION
    ))
    .expect("between months pattern is valid")
});

static BETWEEN_YEARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bentre\s+(?:el\s+)?((?:19|20)\d{2})\s+y\s+(?:el\s+)?((?:19|20)\d{2})\b")
        .expect("between years pattern is valid")
});

static MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b({})(?:\s+(?:de|del))?(?:\s+ano)?\s+(\d{{4}})\b",
        MONTH_ALTERNATION
    ))
    .expect("month-year pattern is valid")
});

static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b({})\b", MONTH_ALTERNATION)).expect("month pattern is valid")
});

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year pattern is valid"));

static PRICE_BETWEEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bentre\s+(\$)?(\d+(?:[.,]\d{{1,2}})?)\s+y\s+\$?{}",
        AMOUNT
    ))
    .expect("price between pattern is valid")
});

static PRICE_ABOVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:mas|mayor(?:es)?|superior(?:es)?)\s+(?:de|a|que)\s+\$?{}",
        AMOUNT
    ))
    .expect("price above pattern is valid")
});

static PRICE_BELOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:menos|menor(?:es)?|inferior(?:es)?)\s+(?:de|a|que)\s+\$?{}",
        AMOUNT
    ))
    .expect("price below pattern is valid")
});

static CUSTOMER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:cliente|usuario|comprador)\s+([a-z0-9][a-z0-9._-]*)")
        .expect("customer pattern is valid")
});

static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bcategoria\s+(?:de\s+|del\s+)?([a-z0-9][a-z0-9_-]*)")
        .expect("category pattern is valid")
});

static PDF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpdf\b").expect("pdf pattern is valid"));

static EXCEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:excel|xlsx|xls)\b").expect("excel pattern is valid"));

static SCREEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:pantalla|screen|json)\b").expect("screen pattern is valid"));

static GROUP_PATTERNS: Lazy<Vec<(Regex, GroupBy)>> = Lazy::new(|| {
    [
        (r"\bpor\s+productos?\b", GroupBy::Product),
        (r"\bpor\s+(?:clientes?|usuarios?)\b", GroupBy::Client),
        (r"\bpor\s+categorias?\b", GroupBy::Category),
        (r"\bpor\s+(?:fechas?|dias?)\b|\bdiari[oa]s?\b", GroupBy::Date),
    ]
    .into_iter()
    .map(|(pattern, group)| (Regex::new(pattern).expect("group pattern is valid"), group))
    .collect()
});

pub const ALL_TIME: &str = "Todo el período";

pub fn parse_prompt(prompt: &str, today: NaiveDate) -> ReportParams {
    let mut text = normalize(prompt);

    let filters = extract_filters(&mut text);
    let format = extract_format(&text);
    let period = extract_period(&text, today);
    let group_by = extract_group(&text);
    let used_defaults = format.is_none() && period.is_none();

    let suggestions = suggestions(period.is_some(), format.is_some(), group_by, &filters);
    let (range, period_text) = match period {
        Some((range, text)) => (Some(range), text),
        None => (None, ALL_TIME.to_string()),
    };
    let format = format.unwrap_or(ReportFormat::Screen);

    ReportParams {
        interpretation: interpretation(&period_text, group_by, &filters, format),
        range,
        period_text,
        group_by,
        format,
        filters,
        used_defaults,
        suggestions,
    }
}

/// Lowercases and strips Spanish diacritics so "Categoría" matches "categoria".
fn normalize(prompt: &str) -> String {
    prompt
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Overwrites a matched span with spaces; byte offsets stay valid.
fn blank(text: &mut String, span: Range<usize>) {
    let spaces = " ".repeat(span.len());
    text.replace_range(span, &spaces);
}

fn extract_filters(text: &mut String) -> ReportFilters {
    let mut filters = ReportFilters::default();

    if let Some((min, max, span)) = price_range(text) {
        filters.price_min = min;
        filters.price_max = max;
        blank(text, span);
    }

    if let Some((name, span)) = named_after(&CUSTOMER_RE, text) {
        filters.customer = Some(name);
        blank(text, span);
    }

    if let Some((name, span)) = named_after(&CATEGORY_RE, text) {
        filters.category = Some(name);
        blank(text, span);
    }

    filters
}

type PriceBounds = (Option<Decimal>, Option<Decimal>, Range<usize>);

fn price_range(text: &str) -> Option<PriceBounds> {
    let between = PRICE_BETWEEN_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let (low_raw, high_raw) = (caps.get(2)?.as_str(), caps.get(3)?.as_str());
        let explicit_currency = caps.get(1).is_some();
        if !explicit_currency && looks_like_year(low_raw) && looks_like_year(high_raw) {
            return None;
        }
        if counts_units(text, caps.get(3)?.end()) {
            return None;
        }
        let (low, high) = (amount(low_raw)?, amount(high_raw)?);
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Some((Some(low), Some(high), whole.range()))
    });
    if between.is_some() {
        return between;
    }

    let bound = |re: &Regex| -> Option<(Decimal, Range<usize>)> {
        re.captures_iter(text).find_map(|caps| {
            let value = caps.get(1)?;
            if counts_units(text, value.end()) {
                return None;
            }
            Some((amount(value.as_str())?, caps.get(0)?.range()))
        })
    };

    if let Some((min, span)) = bound(&PRICE_ABOVE_RE) {
        return Some((Some(min), None, span));
    }
    bound(&PRICE_BELOW_RE).map(|(max, span)| (None, Some(max), span))
}

fn amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', ".")).ok()
}

fn looks_like_year(raw: &str) -> bool {
    YEAR_RE.is_match(raw) && raw.len() == 4
}

/// True when the word after `end` is a unit such as "dias" or "unidades".
fn counts_units(text: &str, end: usize) -> bool {
    text[end..]
        .split_whitespace()
        .next()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .is_some_and(|word| UNIT_WORDS.contains(&word))
}

/// The name captured after a keyword, skipping ordinary words and month names.
fn named_after(re: &Regex, text: &str) -> Option<(String, Range<usize>)> {
    re.captures_iter(text).find_map(|caps| {
        let name = caps.get(1)?;
        let word = name.as_str().trim_end_matches(['.', '-', '_']);
        if word.is_empty() || NOT_A_NAME.contains(&word) || month_number(word).is_some() {
            return None;
        }
        Some((word.to_string(), name.start()..name.start() + word.len()))
    })
}

fn extract_format(text: &str) -> Option<ReportFormat> {
    if PDF_RE.is_match(text) {
        Some(ReportFormat::Pdf)
    } else if EXCEL_RE.is_match(text) {
        Some(ReportFormat::Excel)
    } else if SCREEN_RE.is_match(text) {
        Some(ReportFormat::Screen)
    } else {
        None
    }
}

fn extract_group(text: &str) -> GroupBy {
    GROUP_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, group)| *group)
        .unwrap_or(GroupBy::None)
}

fn extract_period(text: &str, today: NaiveDate) -> Option<(DateRange, String)> {
    explicit_range(text)
        .or_else(|| last_days(text, today))
        .or_else(|| between_months(text, today))
        .or_else(|| between_years(text))
        .or_else(|| month_with_year(text))
        .or_else(|| relative_month(text, today))
        .or_else(|| month_alone(text, today))
        .or_else(|| bare_year(text))
}

fn explicit_range(text: &str) -> Option<(DateRange, String)> {
    RANGE_RE.captures_iter(text).find_map(|caps| {
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let start = day(num(1)?, num(2)?, num(3)?)?;
        let end = day(num(4)?, num(5)?, num(6)?)?;
        let range = DateRange::new(start, end);
        let text = format!(
            "{} al {}",
            range.start.format("%d/%m/%Y"),
            range.end.format("%d/%m/%Y")
        );
        Some((range, text))
    })
}

fn last_days(text: &str, today: NaiveDate) -> Option<(DateRange, String)> {
    let caps = LAST_DAYS_RE.captures(text)?;
    let days: i64 = caps.get(1)?.as_str().parse().ok()?;
    let start = today.checked_sub_signed(Duration::days(days))?;
    Some((
        DateRange::new(start, today),
        format!("Últimos {} días", days),
    ))
}

/// "entre enero y marzo [de 2024]". A range that wraps the new year starts in
/// the year before the one named.
fn between_months(text: &str, today: NaiveDate) -> Option<(DateRange, String)> {
    let caps = BETWEEN_MONTHS_RE.captures(text)?;
    let (first_name, last_name) = (caps.get(1)?.as_str(), caps.get(2)?.as_str());
    let (first, last) = (month_number(first_name)?, month_number(last_name)?);

    let year = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => year_in(text).unwrap_or_else(|| today.year()),
    };
    let first_year = if first <= last { year } else { year - 1 };

    let start = month_range(first_year, first)?.start;
    let end = month_range(year, last)?.end;
    Some((
        DateRange { start, end },
        format!("{} a {} {}", month_title(first_name), month_title(last_name), year),
    ))
}

fn between_years(text: &str) -> Option<(DateRange, String)> {
    let caps = BETWEEN_YEARS_RE.captures(text)?;
    let a: i32 = caps.get(1)?.as_str().parse().ok()?;
    let b: i32 = caps.get(2)?.as_str().parse().ok()?;
    let (from, to) = (a.min(b), a.max(b));
    let start = NaiveDate::from_ymd_opt(from, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(to, 12, 31)?;
    Some((DateRange { start, end }, format!("Años {} a {}", from, to)))
}

fn month_with_year(text: &str) -> Option<(DateRange, String)> {
    MONTH_YEAR_RE.captures_iter(text).find_map(|caps| {
        let month = month_number(caps.get(1)?.as_str())?;
        let year: i32 = caps.get(2)?.as_str().parse().ok()?;
        let range = month_range(year, month)?;
        Some((range, format!("{} {}", month_title(caps.get(1)?.as_str()), year)))
    })
}

fn relative_month(text: &str, today: NaiveDate) -> Option<(DateRange, String)> {
    if ["mes pasado", "ultimo mes", "mes anterior"]
        .iter()
        .any(|k| text.contains(k))
    {
        let first_of_current = today.with_day(1)?;
        let last_of_previous = first_of_current.pred_opt()?;
        let range = month_range(last_of_previous.year(), last_of_previous.month())?;
        return Some((range, "Mes pasado".to_string()));
    }

    if ["este mes", "mes actual"].iter().any(|k| text.contains(k)) {
        let range = DateRange::new(today.with_day(1)?, today);
        return Some((range, "Mes actual".to_string()));
    }

    None
}

/// A month name not next to a year: the year is taken from anywhere else in
/// the prompt, or the current one.
fn month_alone(text: &str, today: NaiveDate) -> Option<(DateRange, String)> {
    let caps = MONTH_RE.captures(text)?;
    let name = caps.get(1)?.as_str();
    let year = year_in(text).unwrap_or_else(|| today.year());
    let range = month_range(year, month_number(name)?)?;
    Some((range, format!("{} {}", month_title(name), year)))
}

fn bare_year(text: &str) -> Option<(DateRange, String)> {
    let year = year_in(text)?;
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
    Some((DateRange::new(start, end), format!("Año {}", year)))
}

fn year_in(text: &str) -> Option<i32> {
    YEAR_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

fn group_label(group_by: GroupBy) -> Option<&'static str> {
    match group_by {
        GroupBy::None => None,
        GroupBy::Product => Some("producto"),
        GroupBy::Client => Some("cliente"),
        GroupBy::Category => Some("categoría"),
        GroupBy::Date => Some("fecha"),
    }
}

fn interpretation(
    period_text: &str,
    group_by: GroupBy,
    filters: &ReportFilters,
    format: ReportFormat,
) -> Vec<String> {
    let mut lines = vec![format!("Período: {}", period_text)];

    if let Some(label) = group_label(group_by) {
        lines.push(format!("Agrupado por {}", label));
    }
    if let Some(ref customer) = filters.customer {
        lines.push(format!("Cliente: {}", customer));
    }
    if let Some(ref category) = filters.category {
        lines.push(format!("Categoría: {}", category));
    }
    match (filters.price_min, filters.price_max) {
        (Some(min), Some(max)) => lines.push(format!("Precio unitario: entre ${} y ${}", min, max)),
        (Some(min), None) => lines.push(format!("Precio unitario: desde ${}", min)),
        (None, Some(max)) => lines.push(format!("Precio unitario: hasta ${}", max)),
        (None, None) => {}
    }

    let format = match format {
        ReportFormat::Pdf => "PDF",
        ReportFormat::Excel => "Excel",
        ReportFormat::Screen => "Pantalla",
    };
    lines.push(format!("Formato: {}", format));

    lines
}

/// Hints are only given while the period or the format is still missing.
fn suggestions(
    has_period: bool,
    has_format: bool,
    group_by: GroupBy,
    filters: &ReportFilters,
) -> Vec<String> {
    if has_period && has_format {
        return Vec::new();
    }

    let mut hints = Vec::new();
    if !has_period {
        hints.push("Agrega un período, por ejemplo 'enero 2024' o 'últimos 30 días'".to_string());
    }
    if !has_format {
        hints.push("Indica el formato: 'pdf', 'excel' o 'pantalla'".to_string());
    }
    if group_by == GroupBy::None && filters.is_empty() {
        hints.push(
            "Agrupa o filtra, por ejemplo 'por producto', 'cliente ana' o 'más de 500'".to_string(),
        );
    }
    hints
}

fn day(d: u32, m: u32, y: u32) -> Option<NaiveDate> {
    let year = if y < 100 { 2000 + y } else { y };
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, m, d)
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(month, _)| *month == name)
        .map(|(_, n)| *n)
}

fn month_title(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?
    };
    Some(DateRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 3, 15)
    }

    #[test]
    fn month_with_year_in_excel() {
        let params = parse_prompt("ventas de enero 2024 en excel", today());

        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2024, 1, 1),
                end: date(2024, 1, 31)
            })
        );
        assert_eq!(params.format, ReportFormat::Excel);
        assert_eq!(params.group_by, GroupBy::None);
        assert_eq!(params.period_text, "Enero 2024");
        assert!(!params.used_defaults);
    }

    #[test]
    fn unrecognized_prompt_falls_back_to_defaults() {
        let params = parse_prompt("hola, ¿qué tal?", today());

        assert_eq!(params.range, None);
        assert_eq!(params.format, ReportFormat::Screen);
        assert_eq!(params.group_by, GroupBy::None);
        assert_eq!(params.period_text, ALL_TIME);
        assert!(params.used_defaults);

        assert!(parse_prompt("", today()).used_defaults);
    }

    #[test]
    fn explicit_range_with_al() {
        let params = parse_prompt("reporte del 01/02/2024 al 15/02/2024 en pdf", today());

        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2024, 2, 1),
                end: date(2024, 2, 15)
            })
        );
        assert_eq!(params.format, ReportFormat::Pdf);
        assert_eq!(params.period_text, "01/02/2024 al 15/02/2024");
    }

    #[test]
    fn explicit_range_variants() {
        let reversed = parse_prompt("ventas 31-12-23 al 01-12-23", today());
        assert_eq!(
            reversed.range,
            Some(DateRange {
                start: date(2023, 12, 1),
                end: date(2023, 12, 31)
            })
        );

        let hasta = parse_prompt("desde 1/3/2025 hasta 10/3/2025", today());
        assert_eq!(hasta.range.unwrap().end, date(2025, 3, 10));
    }

    #[test]
    fn invalid_calendar_date_falls_through_to_year() {
        let params = parse_prompt("del 31/02/2024 al 05/03/2024", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2024, 1, 1),
                end: date(2024, 12, 31)
            })
        );
    }

    #[test]
    fn month_of_with_de() {
        let params = parse_prompt("Ventas de Octubre de 2023 por producto", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2023, 10, 1),
                end: date(2023, 10, 31)
            })
        );
        assert_eq!(params.group_by, GroupBy::Product);
    }

    #[test]
    fn month_without_year_uses_current_year() {
        let params = parse_prompt("ventas del mes de febrero", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2025, 2, 1),
                end: date(2025, 2, 28)
            })
        );
    }

    #[test]
    fn december_ends_on_the_31st() {
        assert_eq!(month_range(2024, 12).unwrap().end, date(2024, 12, 31));
        assert_eq!(month_range(2024, 2).unwrap().end, date(2024, 2, 29));
    }

    #[test]
    fn bare_year_covers_the_whole_year() {
        let params = parse_prompt("ventas 2023", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2023, 1, 1),
                end: date(2023, 12, 31)
            })
        );
        assert_eq!(params.period_text, "Año 2023");
    }

    #[test]
    fn last_n_days() {
        let params = parse_prompt("ventas de los últimos 7 días", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2025, 3, 8),
                end: date(2025, 3, 15)
            })
        );
    }

    #[test]
    fn relative_months() {
        let january = date(2025, 1, 20);
        let previous = parse_prompt("ventas del mes pasado", january);
        assert_eq!(
            previous.range,
            Some(DateRange {
                start: date(2024, 12, 1),
                end: date(2024, 12, 31)
            })
        );

        let current = parse_prompt("ventas de este mes en pantalla", january);
        assert_eq!(
            current.range,
            Some(DateRange {
                start: date(2025, 1, 1),
                end: january
            })
        );
        assert_eq!(current.format, ReportFormat::Screen);
        assert!(!current.used_defaults);
    }

    #[test]
    fn format_priority_and_word_boundaries() {
        assert_eq!(parse_prompt("en pdf o excel", today()).format, ReportFormat::Pdf);
        assert_eq!(parse_prompt("exportar a XLSX", today()).format, ReportFormat::Excel);
        assert_eq!(parse_prompt("show on screen", today()).format, ReportFormat::Screen);
        // "pdfs" is not a format keyword
        assert_eq!(parse_prompt("pdfs", today()).format, ReportFormat::Screen);
    }

    #[test]
    fn format_alone_still_counts_as_recognized() {
        let params = parse_prompt("dame todo en excel", today());
        assert_eq!(params.range, None);
        assert!(!params.used_defaults);
    }

    #[test]
    fn groupings() {
        assert_eq!(parse_prompt("ventas por cliente", today()).group_by, GroupBy::Client);
        assert_eq!(parse_prompt("ventas por categoría", today()).group_by, GroupBy::Category);
        assert_eq!(parse_prompt("ventas por dia", today()).group_by, GroupBy::Date);
        assert_eq!(parse_prompt("reporte diario", today()).group_by, GroupBy::Date);
        assert_eq!(parse_prompt("ventas por usuarios", today()).group_by, GroupBy::Client);
    }
    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    #[test]
    fn month_with_the_word_year() {
        let expected = Some(DateRange {
            start: date(2024, 1, 1),
            end: date(2024, 1, 31),
        });

        assert_eq!(parse_prompt("ventas de enero del año 2024", today()).range, expected);
        assert_eq!(parse_prompt("ventas enero año 2024", today()).range, expected);
        assert_eq!(parse_prompt("ventas de enero, año 2024 en pdf", today()).range, expected);
        assert_eq!(
            parse_prompt("ventas de enero del año 2024", today()).period_text,
            "Enero 2024"
        );
    }

    #[test]
    fn between_two_months() {
        let params = parse_prompt("ventas entre enero y marzo de 2024", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2024, 1, 1),
                end: date(2024, 3, 31)
            })
        );
        assert_eq!(params.period_text, "Enero a Marzo 2024");

        let this_year = parse_prompt("entre febrero y abril", today());
        assert_eq!(
            this_year.range,
            Some(DateRange {
                start: date(2025, 2, 1),
                end: date(2025, 4, 30)
            })
        );

        let wrapping = parse_prompt("entre noviembre y febrero 2024", today());
        assert_eq!(
            wrapping.range,
            Some(DateRange {
                start: date(2023, 11, 1),
                end: date(2024, 2, 29)
            })
        );
    }

    #[test]
    fn between_two_years() {
        let params = parse_prompt("ventas entre 2022 y 2023", today());
        assert_eq!(
            params.range,
            Some(DateRange {
                start: date(2022, 1, 1),
                end: date(2023, 12, 31)
            })
        );
        assert!(params.filters.is_empty());
    }

    #[test]
    fn price_filters() {
        let between = parse_prompt("ventas entre 500 y 1000 en pdf", today());
        assert_eq!(between.filters.price_min, Some(dec("500")));
        assert_eq!(between.filters.price_max, Some(dec("1000")));
        assert_eq!(between.range, None);
        assert_eq!(between.format, ReportFormat::Pdf);

        let above = parse_prompt("productos de más de $800,50", today());
        assert_eq!(above.filters.price_min, Some(dec("800.50")));
        assert_eq!(above.filters.price_max, None);

        let below = parse_prompt("ventas menores a 500 de marzo 2024", today());
        assert_eq!(below.filters.price_max, Some(dec("500")));
        assert_eq!(below.range.unwrap().start, date(2024, 3, 1));
    }

    #[test]
    fn price_numbers_are_not_read_as_years() {
        let params = parse_prompt("ventas entre 1500 y 2000", today());
        assert_eq!(params.filters.price_min, Some(dec("1500")));
        assert_eq!(params.filters.price_max, Some(dec("2000")));
        assert_eq!(params.range, None);

        let reversed = parse_prompt("entre $2024 y $2020", today());
        assert_eq!(reversed.filters.price_min, Some(dec("2020")));
        assert_eq!(reversed.range, None);
    }

    #[test]
    fn counts_are_not_prices() {
        let params = parse_prompt("clientes con más de 3 unidades", today());
        assert!(params.filters.is_empty());

        let days = parse_prompt("ventas de los ultimos 30 dias", today());
        assert!(days.filters.is_empty());
        assert_eq!(days.range.unwrap().start, date(2025, 2, 13));
    }

    #[test]
    fn customer_and_category_filters() {
        let params = parse_prompt(
            "Compras del cliente Paul10 en noviembre de la categoría lavado",
            today(),
        );
        assert_eq!(params.filters.customer.as_deref(), Some("paul10"));
        assert_eq!(params.filters.category.as_deref(), Some("lavado"));
        assert_eq!(params.range.unwrap().start, date(2025, 11, 1));
    }

    #[test]
    fn grouping_words_are_not_names() {
        let params = parse_prompt("ventas por cliente en pdf", today());
        assert_eq!(params.group_by, GroupBy::Client);
        assert_eq!(params.filters.customer, None);

        let params = parse_prompt("ventas por categoria del mes pasado", today());
        assert_eq!(params.group_by, GroupBy::Category);
        assert_eq!(params.filters.category, None);

        let both = parse_prompt("ventas por cliente ana.m", today());
        assert_eq!(both.group_by, GroupBy::Client);
        assert_eq!(both.filters.customer.as_deref(), Some("ana.m"));
    }

    #[test]
    fn interpretation_lists_what_was_understood() {
        let params = parse_prompt(
            "ventas de enero 2024 por producto del cliente ana entre 10 y 20 en excel",
            today(),
        );

        assert_eq!(
            params.interpretation,
            vec![
                "Período: Enero 2024",
                "Agrupado por producto",
                "Cliente: ana",
                "Precio unitario: entre $10 y $20",
                "Formato: Excel",
            ]
        );
        assert!(params.suggestions.is_empty());
    }

    #[test]
    fn suggestions_point_at_missing_pieces() {
        let params = parse_prompt("hola", today());
        assert_eq!(params.suggestions.len(), 3);
        assert_eq!(params.interpretation, vec!["Período: Todo el período", "Formato: Pantalla"]);

        let with_format = parse_prompt("todo en pdf por producto", today());
        assert_eq!(with_format.suggestions.len(), 1);
        assert!(with_format.suggestions[0].contains("período"));
    }
}

