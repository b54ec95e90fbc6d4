pub mod claim;
pub mod error;
pub mod invoice;
pub mod method;
pub mod payment;
pub mod registry;

pub use claim::{Claim, ClaimEntry, ClaimLine, ClaimState, FeeBasis, Pricing};
pub use error::FinanceError;
pub use invoice::{
    INVOICE_NUMBER_WIDTH, Invoice, InvoiceDocument, InvoiceDraft, InvoiceParty, InvoicePosition,
    InvoiceSubject, InvoiceTotals, MAX_NUMBERING_ATTEMPTS, format_invoice_no,
    numeric_invoice_no,
};
pub use method::{
    BankTransfer, Cash, ContractRef, DebitSequence, DirectDebit, Initialization, MandateRef,
    PaymentMethod, PaymentMethodKind, PaymentProvider, Sepa, SettlementEffect, SettlementRequest,
};
pub use payment::{Payment, PaymentState};
pub use registry::{PaymentMethodRecord, PaymentMethodRegistry};
