use std::fmt::Write as _;

use hub_finance::Invoice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub filename: String,
    pub mimetype: String,
    pub content: Vec<u8>,
}

impl RenderedDocument {
    /// File extension taken from the filename, `bin` if it has none.
    pub fn extension(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin")
    }
}

/// Turns a frozen invoice into a file. Must not look at anything but the invoice.
pub trait DocumentRenderer: Send + Sync {
    fn generate(&self, invoice: &Invoice) -> anyhow::Result<RenderedDocument>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextInvoiceRenderer;

impl DocumentRenderer for TextInvoiceRenderer {
    fn generate(&self, invoice: &Invoice) -> anyhow::Result<RenderedDocument> {
        let draft = &invoice.draft;
        let mut out = String::new();

        writeln!(out, "{}", draft.sender.address_block())?;
        writeln!(out)?;
        writeln!(out, "{}", draft.recipient.address_block())?;
        writeln!(out)?;
        writeln!(out, "Invoice {}  Date {}", invoice.full_invoice_no, draft.date)?;
        if !draft.introductory_text.is_empty() {
            writeln!(out, "\n{}", draft.introductory_text)?;
        }
        writeln!(out)?;

        for p in invoice.positions() {
            writeln!(
                out,
                "{:>3}  {}  {} - {}",
                p.position,
                p.item,
                p.period_start.format("%Y-%m-%d %H:%M"),
                p.period_end.format("%Y-%m-%d %H:%M"),
            )?;
            writeln!(
                out,
                "     {} {} x {} = {:.2}  -{}%  {:.2}  +{}%  {:.2} {}",
                p.quantity.normalize(),
                p.unit,
                p.price.normalize(),
                p.net,
                p.discount.normalize(),
                p.discounted_net,
                p.tax_rate.normalize(),
                p.gross,
                p.currency,
            )?;
        }

        let totals = invoice.totals();
        writeln!(out)?;
        writeln!(out, "Net       {:.2}", totals.discounted_net)?;
        writeln!(out, "Tax       {:.2}", totals.tax)?;
        writeln!(out, "Total     {:.2}", totals.gross)?;

        for text in [
            &draft.additional_text,
            &draft.payment_provider_text,
            &draft.footer_text,
        ] {
            if !text.is_empty() {
                writeln!(out, "\n{text}")?;
            }
        }

        Ok(RenderedDocument {
            filename: format!("{}.txt", invoice.full_invoice_no),
            mimetype: "text/plain".to_string(),
            content: out.into_bytes(),
        })
    }
}
