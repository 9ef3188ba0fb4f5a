use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rust_xlsxwriter::{Format, Workbook};

use crate::{
    error::{AppError, Result},
    models::{Order, OrderItemDetail, ReportCell, ReportTable},
};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const ROW_HEIGHT: f32 = 7.0;

fn pdf_error(err: printpdf::Error) -> AppError {
    AppError::InternalError(format!("PDF rendering failed: {}", err))
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> AppError {
    AppError::InternalError(format!("Spreadsheet rendering failed: {}", err))
}

pub fn report_filename(table: &ReportTable, extension: &str) -> String {
    let slug: String = table
        .title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}.{}", slug, extension)
}

/// Writes text top-down and starts a new page when the current one fills up.
struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.ensure_space(size);
        self.layer
            .use_text(text, size, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= size * 0.6;
    }

    fn text(&mut self, text: &str) {
        self.ensure_space(ROW_HEIGHT);
        self.layer
            .use_text(text, 10.0, Mm(MARGIN), Mm(self.y), &self.regular);
        self.y -= ROW_HEIGHT;
    }

    fn row(&mut self, cells: &[String], bold: bool) {
        self.ensure_space(ROW_HEIGHT);
        let width = (PAGE_WIDTH - 2.0 * MARGIN) / cells.len().max(1) as f32;
        let max_chars = (width / 2.0) as usize;
        let font = if bold { &self.bold } else { &self.regular };

        for (i, cell) in cells.iter().enumerate() {
            let text: String = cell.chars().take(max_chars).collect();
            self.layer.use_text(
                text,
                9.0,
                Mm(MARGIN + i as f32 * width),
                Mm(self.y),
                font,
            );
        }
        self.y -= ROW_HEIGHT;
    }

    fn rule(&mut self) {
        let y = self.y + ROW_HEIGHT - 2.0;
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc.save_to_bytes().map_err(pdf_error)
    }
}

pub fn render_pdf(table: &ReportTable) -> Result<Vec<u8>> {
    let mut pdf = PdfWriter::new(&table.title)?;

    pdf.heading(&table.title, 18.0);
    pdf.text(&format!("Período: {}", table.period));
    pdf.text("");

    pdf.row(&table.headers, true);
    pdf.rule();

    if table.rows.is_empty() {
        pdf.text("No hay ventas en el período seleccionado.");
    }
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(ReportCell::display).collect();
        pdf.row(&cells, false);
    }

    pdf.text("");
    pdf.text(&format!("Pedidos: {}", table.totals.orders));
    pdf.text(&format!("Unidades: {}", table.totals.units));
    pdf.text(&format!(
        "Ingresos: {}",
        ReportCell::Money(table.totals.revenue).display()
    ));

    pdf.finish()
}

pub fn render_receipt(order: &Order, customer: &str, items: &[OrderItemDetail]) -> Result<Vec<u8>> {
    let mut pdf = PdfWriter::new(&format!("Recibo pedido #{}", order.id))?;

    pdf.heading(&format!("Recibo - Pedido #{}", order.id), 18.0);
    pdf.text(&format!("Cliente: {}", customer));
    if let Some(completed_at) = order.completed_at {
        pdf.text(&format!("Fecha: {}", completed_at.format("%d/%m/%Y %H:%M")));
    }
    pdf.text(&format!("Estado: {:?}", order.status));
    pdf.text("");

    let headers = ["Producto", "Cantidad", "Precio", "Subtotal"].map(str::to_string);
    pdf.row(&headers, true);
    pdf.rule();

    for item in items {
        let subtotal = item.price * Decimal::from(item.quantity);
        pdf.row(
            &[
                item.product_name.clone(),
                item.quantity.to_string(),
                ReportCell::Money(item.price).display(),
                ReportCell::Money(subtotal).display(),
            ],
            false,
        );
    }

    pdf.text("");
    pdf.heading(
        &format!("Total: {}", ReportCell::Money(order.total_price).display()),
        12.0,
    );

    pdf.finish()
}

pub fn render_xlsx(table: &ReportTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("$#,##0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Reporte").map_err(xlsx_error)?;

    sheet
        .write_string_with_format(0, 0, table.title.as_str(), &bold)
        .map_err(xlsx_error)?;
    sheet
        .write_string(1, 0, format!("Período: {}", table.period))
        .map_err(xlsx_error)?;

    let header_row = 3;
    for (col, header) in table.headers.iter().enumerate() {
        let col = col as u16;
        sheet
            .write_string_with_format(header_row, col, header.as_str(), &bold)
            .map_err(xlsx_error)?;
        sheet.set_column_width(col, 18).map_err(xlsx_error)?;
    }

    let mut row_index = header_row + 1;
    for row in &table.rows {
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            let written = match cell {
                ReportCell::Text(text) => sheet.write_string(row_index, col, text.as_str()),
                ReportCell::Integer(n) => sheet.write_number(row_index, col, *n as f64),
                ReportCell::Money(m) => sheet.write_number_with_format(
                    row_index,
                    col,
                    m.to_f64().unwrap_or_default(),
                    &money,
                ),
            };
            written.map_err(xlsx_error)?;
        }
        row_index += 1;
    }

    row_index += 1;
    let totals: [(&str, ReportCell); 3] = [
        ("Pedidos", ReportCell::Integer(table.totals.orders)),
        ("Unidades", ReportCell::Integer(table.totals.units)),
        ("Ingresos", ReportCell::Money(table.totals.revenue)),
    ];
    for (label, value) in totals {
        sheet
            .write_string_with_format(row_index, 0, label, &bold)
            .map_err(xlsx_error)?;
        let written = match value {
            ReportCell::Money(m) => sheet.write_number_with_format(
                row_index,
                1,
                m.to_f64().unwrap_or_default(),
                &money,
            ),
            ReportCell::Integer(n) => sheet.write_number(row_index, 1, n as f64),
            ReportCell::Text(t) => sheet.write_string(row_index, 1, t),
        };
        written.map_err(xlsx_error)?;
        row_index += 1;
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}
