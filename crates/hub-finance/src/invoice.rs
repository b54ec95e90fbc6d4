use chrono::{DateTime, NaiveDate, Utc};
use hub_core::Actor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::claim::Claim;

pub const INVOICE_NUMBER_WIDTH: usize = 5;
pub const MAX_NUMBERING_ATTEMPTS: u32 = 10;

/// Hex characters of the content digest kept in the storage path.
const PATH_DIGEST_LEN: usize = 16;

pub fn format_invoice_no(number: u64) -> String {
    format!("{number:0width$}", width = INVOICE_NUMBER_WIDTH)
}

/// Numbers with a dash (manual or imported ones) are not part of the sequence.
pub fn numeric_invoice_no(invoice_no: &str) -> Option<u64> {
    if invoice_no.contains('-') {
        return None;
    }
    invoice_no.trim().parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceParty {
    pub name: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub tax_id: Option<String>,
    pub vat_id: Option<String>,
    pub telephone: Option<String>,
    pub website: Option<String>,
}

impl InvoiceParty {
    pub fn snapshot(actor: &Actor) -> Self {
        Self {
            name: actor.name.clone(),
            street: actor.address.street_line(),
            postal_code: actor.address.postal_code.clone(),
            city: actor.address.city.clone(),
            country: actor.address.country.clone(),
            tax_id: actor.tax_id.clone(),
            vat_id: actor.vat_id.clone(),
            telephone: actor.telephone_public.clone(),
            website: actor.website.clone(),
        }
    }

    /// Multi-line address block as printed in the letter window.
    pub fn address_block(&self) -> String {
        let locality = format!("{} {}", self.postal_code, self.city);
        let mut lines: Vec<&str> = [self.name.as_str(), self.street.as_str(), locality.trim()]
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect();
        if !self.country.is_empty() {
            lines.push(&self.country);
        }
        let mut block = lines.join("\n");
        if let Some(vat_id) = &self.vat_id
            && !vat_id.is_empty()
        {
            block.push_str("\nVAT-ID: ");
            block.push_str(vat_id);
        }
        block
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePosition {
    pub position: u32,
    pub claim_id: i64,
    pub item: String,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub currency: String,
    pub net: Decimal,
    pub discount: Decimal,
    pub discounted_net: Decimal,
    pub tax_rate: Decimal,
    pub gross: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl InvoicePosition {
    fn from_claim(position: u32, claim: &Claim) -> Self {
        let entry = &claim.entry;
        Self {
            position,
            claim_id: claim.id,
            item: entry.item.clone(),
            quantity: entry.quantity,
            unit: entry.unit.clone(),
            price: entry.price,
            currency: entry.currency.clone(),
            net: entry.net,
            discount: entry.discount,
            discounted_net: entry.discounted_net,
            tax_rate: entry.tax_rate,
            gross: entry.gross,
            period_start: entry.period_start,
            period_end: entry.period_end,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub net: Decimal,
    pub discounted_net: Decimal,
    pub tax: Decimal,
    pub gross: Decimal,
}

impl InvoiceTotals {
    pub fn of(positions: &[InvoicePosition]) -> Self {
        let mut totals = positions.iter().fold(Self::default(), |acc, p| Self {
            net: acc.net + p.net,
            discounted_net: acc.discounted_net + p.discounted_net,
            tax: Decimal::ZERO,
            gross: acc.gross + p.gross,
        });
        totals.tax = totals.gross - totals.discounted_net;
        totals
    }
}

/// Who and what an invoice is drawn up for.
#[derive(Debug, Clone, Copy)]
pub struct InvoiceSubject<'a> {
    pub contract_id: i64,
    pub contract_uuid: Uuid,
    pub creditor: &'a Actor,
    pub debitor: &'a Actor,
}

/// Everything about an invoice except its number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub contract_id: i64,
    pub contract_uuid: Uuid,
    pub creditor: Uuid,
    pub debitor: Uuid,
    pub prefix: String,
    pub is_cancellation: bool,
    pub date: NaiveDate,
    pub locale: String,
    pub sender: InvoiceParty,
    pub recipient: InvoiceParty,
    pub introductory_text: String,
    pub additional_text: String,
    pub footer_text: String,
    pub payment_provider_text: String,
    pub positions: Vec<InvoicePosition>,
}

impl InvoiceDraft {
    /// Positions follow the claims ordered by descending period start.
    pub fn build(
        subject: InvoiceSubject<'_>,
        claims: &[Claim],
        payment_provider_text: impl Into<String>,
        is_cancellation: bool,
        date: NaiveDate,
    ) -> Self {
        let mut ordered: Vec<&Claim> = claims.iter().collect();
        ordered.sort_by(|a, b| {
            b.entry
                .period_start
                .cmp(&a.entry.period_start)
                .then(a.id.cmp(&b.id))
        });
        let positions = ordered
            .into_iter()
            .zip(1u32..)
            .map(|(claim, n)| InvoicePosition::from_claim(n, claim))
            .collect();

        let creditor = subject.creditor;
        Self {
            contract_id: subject.contract_id,
            contract_uuid: subject.contract_uuid,
            creditor: creditor.id,
            debitor: subject.debitor.id,
            prefix: creditor.invoice_prefix(is_cancellation).to_string(),
            is_cancellation,
            date,
            locale: creditor.language.clone(),
            sender: InvoiceParty::snapshot(creditor),
            recipient: InvoiceParty::snapshot(subject.debitor),
            introductory_text: creditor.invoice.introductory_text.clone(),
            additional_text: creditor.invoice.additional_text.clone(),
            footer_text: creditor.invoice.footer_text.clone(),
            payment_provider_text: payment_provider_text.into(),
            positions,
        }
    }

    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals::of(&self.positions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_no: String,
    pub full_invoice_no: String,
    #[serde(flatten)]
    pub draft: InvoiceDraft,
    pub document: Option<InvoiceDocument>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn issue(id: i64, draft: InvoiceDraft, invoice_no: String, created_at: DateTime<Utc>) -> Self {
        let full_invoice_no = format!("{}-{}", draft.prefix, invoice_no);
        Self {
            id,
            invoice_no,
            full_invoice_no,
            draft,
            document: None,
            created_at,
        }
    }

    pub fn positions(&self) -> &[InvoicePosition] {
        &self.draft.positions
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.draft.totals()
    }
}

/// Rendered invoice file, addressed by creditor, contract and content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub path: String,
    pub mimetype: String,
    pub sha256: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl InvoiceDocument {
    pub fn new(invoice: &Invoice, creditor_slug: &str, extension: &str, mimetype: &str, content: Vec<u8>) -> Self {
        let sha256 = hex_digest(&content);
        let path = format!(
            "invoices/{}/{}/{}--{}.{}",
            creditor_slug,
            invoice.draft.contract_uuid,
            invoice.full_invoice_no,
            &sha256[..PATH_DIGEST_LEN],
            extension,
        );
        Self {
            path,
            mimetype: mimetype.to_string(),
            sha256,
            content,
        }
    }
}

fn hex_digest(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use hub_core::{ActorKind, Address, InvoiceSettings};

    use super::*;
    use crate::claim::{ClaimEntry, ClaimLine, Pricing};

    fn actor(name: &str, prefix: &str) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            kind: ActorKind::Organization,
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            address: Address {
                street: "Hauptstr.".to_string(),
                street_number: "1".to_string(),
                postal_code: "10115".to_string(),
                city: "Berlin".to_string(),
                country: "DE".to_string(),
            },
            bank_account: None,
            telephone_public: None,
            website: None,
            tax_id: Some("12/345/67890".to_string()),
            vat_id: Some("DE123456789".to_string()),
            language: "de".to_string(),
            invoice: InvoiceSettings {
                numbers_prefix: prefix.to_string(),
                introductory_text: "Thank you".to_string(),
                ..InvoiceSettings::default()
            },
        }
    }

    fn claim(id: i64, start_offset_days: i64, gross: i64) -> Claim {
        let start = Utc::now() + Duration::days(start_offset_days);
        let entry = ClaimEntry::priced(
            ClaimLine {
                item: format!("Day {start_offset_days}"),
                quantity: Decimal::ONE,
                unit: "d".to_string(),
                price: Decimal::new(gross, 0),
                currency: "EUR".to_string(),
                period_start: start,
                period_end: start + Duration::days(1),
            },
            Pricing::default(),
        );
        Claim::new(id, 1, entry, Utc::now())
    }

    #[test]
    fn numbering_skips_dashed_numbers() {
        assert_eq!(numeric_invoice_no("00042"), Some(42));
        assert_eq!(numeric_invoice_no("2023-99999"), None);
        assert_eq!(numeric_invoice_no("7-1"), None);
        assert_eq!(format_invoice_no(123456), "123456");
    }

    #[test]
    fn draft_orders_positions_by_descending_period_start() {
        let creditor = actor("Bike Coop", "BC");
        let debitor = actor("Jane", "");
        let claims = vec![claim(1, 0, 10), claim(2, 5, 20), claim(3, 2, 30)];

        let draft = InvoiceDraft::build(
            InvoiceSubject {
                contract_id: 1,
                contract_uuid: Uuid::new_v4(),
                creditor: &creditor,
                debitor: &debitor,
            },
            &claims,
            "Pay by transfer",
            false,
            Utc::now().date_naive(),
        );

        let ids: Vec<i64> = draft.positions.iter().map(|p| p.claim_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        let numbers: Vec<u32> = draft.positions.iter().map(|p| p.position).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(draft.prefix, "BC");
        assert_eq!(draft.sender.street, "Hauptstr. 1");
        assert_eq!(draft.introductory_text, "Thank you");
        assert_eq!(draft.payment_provider_text, "Pay by transfer");
        assert_eq!(draft.totals().gross, Decimal::new(60, 0));
    }

    #[test]
    fn issued_invoice_joins_prefix_and_number() {
        let creditor = actor("Bike Coop", "BC");
        let debitor = actor("Jane", "");
        let draft = InvoiceDraft::build(
            InvoiceSubject {
                contract_id: 1,
                contract_uuid: Uuid::new_v4(),
                creditor: &creditor,
                debitor: &debitor,
            },
            &[claim(1, 0, 10)],
            "",
            false,
            Utc::now().date_naive(),
        );
        let invoice = Invoice::issue(9, draft, format_invoice_no(3), Utc::now());
        assert_eq!(invoice.full_invoice_no, "BC-00003");

        let document = InvoiceDocument::new(&invoice, "bike-coop", "txt", "text/plain", b"hello".to_vec());
        assert_eq!(document.sha256.len(), 64);
        assert!(document.path.starts_with(&format!(
            "invoices/bike-coop/{}/BC-00003--",
            invoice.draft.contract_uuid
        )));
        assert!(document.path.ends_with(".txt"));
    }

    #[test]
    fn address_block_appends_vat_id() {
        let party = InvoiceParty::snapshot(&actor("Bike Coop", ""));
        assert_eq!(
            party.address_block(),
            "Bike Coop\nHauptstr. 1\n10115 Berlin\nDE\nVAT-ID: DE123456789"
        );
    }

    #[test]
    fn totals_derive_tax_from_gross() {
        let positions = vec![InvoicePosition {
            position: 1,
            claim_id: 1,
            item: "x".to_string(),
            quantity: Decimal::ONE,
            unit: "u".to_string(),
            price: Decimal::new(100, 0),
            currency: "EUR".to_string(),
            net: Decimal::new(100, 0),
            discount: Decimal::new(10, 0),
            discounted_net: Decimal::new(90, 0),
            tax_rate: Decimal::new(19, 0),
            gross: Decimal::new(1071, 1),
            period_start: Utc::now(),
            period_end: Utc::now(),
        }];
        let totals = InvoiceTotals::of(&positions);
        assert_eq!(totals.tax, Decimal::new(171, 1));
    }
}
