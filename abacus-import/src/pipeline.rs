use std::collections::BTreeMap;
use std::sync::Arc;

use abacus_audit::ENTITY_IMPORT_SESSION;
use abacus_audit::record_create;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_ledger::validate_posting;
use abacus_model::Account;
use abacus_model::AccountId;
use abacus_model::AccountType;
use abacus_model::ImportSession;
use abacus_model::ImportSessionId;
use abacus_model::ImportStatus;
use abacus_model::ImportType;
use abacus_model::LedgerId;
use abacus_model::MAX_ACCOUNT_DEPTH;
use abacus_model::SORT_ORDER_GAP;
use abacus_model::Transaction;
use abacus_model::TransactionId;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use sha2::Digest;
use sha2::Sha256;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::ImportError;
use crate::ImportResult;
use crate::banks::BankRecordParser;
use crate::banks::CreditCardParser;
use crate::banks::bank_config;
use crate::myab::MyabCsvParser;
use crate::parser::ParsedTransaction;
use crate::parser::RowError;
use crate::parser::StatementParser;
use crate::suggest::CategoryEnhancer;
use crate::suggest::CategorySuggester;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_file_bytes: usize,
    pub max_rows: usize,
    pub preview_sample_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_rows: 2000,
            preview_sample_rows: 50,
        }
    }
}

/// How one distinct input account name resolves: to an existing account or
/// to a new one the execute phase will materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMapping {
    pub source_name: String,
    pub account_type: AccountType,
    pub path_segments: Vec<String>,
    pub account_id: Option<AccountId>,
    pub create_new: bool,
    pub suggested_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateWarning {
    pub row_number: usize,
    pub existing_transaction_ids: Vec<TransactionId>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ImportPreview {
    pub session_id: ImportSessionId,
    pub total_count: usize,
    pub date_range: (NaiveDate, NaiveDate),
    pub sample: Vec<ParsedTransaction>,
    pub duplicates: Vec<DuplicateWarning>,
    pub account_mappings: Vec<AccountMapping>,
    pub validation_errors: Vec<RowError>,
    pub is_valid: bool,
}

#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub session: ImportSession,
    pub created_accounts: Vec<Account>,
}

pub struct ImportEngine {
    store: Arc<MemoryStore>,
    config: ImportConfig,
    suggester: CategorySuggester,
    enhancer: Option<Arc<dyn CategoryEnhancer>>,
}

impl ImportEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            config: ImportConfig::default(),
            suggester: CategorySuggester,
            enhancer: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_enhancer(mut self, enhancer: Arc<dyn CategoryEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Phase 1: parse the upload, propose mappings, flag duplicates, and
    /// persist a PENDING session together with the raw source.
    pub async fn create_preview(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        filename: &str,
        content: &str,
        import_type: ImportType,
        bank_code: Option<&str>,
    ) -> ImportResult<ImportPreview> {
        if content.len() > self.config.max_file_bytes {
            return Err(ImportError::Validation(format!(
                "file exceeds the {} byte limit",
                self.config.max_file_bytes
            )));
        }
        let source_hash = content_digest(content);
        let parser = select_parser(import_type, bank_code)?;

        let (mut rows, errors) = parser.parse(content);
        if rows.len() > self.config.max_rows {
            return Err(ImportError::Validation(format!(
                "transaction limit exceeded (max {})",
                self.config.max_rows
            )));
        }
        self.enrich_categories(&mut rows).await;

        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;

        let account_mappings = propose_mappings(&uow, ledger_id, &rows);
        let duplicates = detect_duplicates(&uow, ledger_id, &rows, &account_mappings);
        let date_range = date_range_of(&rows);

        let now = Utc::now();
        let session = ImportSession {
            id: Uuid::new_v4(),
            ledger_id,
            import_type,
            source_filename: filename.to_string(),
            source_hash,
            bank_code: bank_code.map(str::to_string),
            status: ImportStatus::Pending,
            progress_current: 0,
            progress_total: (rows.len() + errors.len()) as i32,
            imported_count: 0,
            skipped_count: 0,
            error_count: errors.len() as i32,
            created_accounts_count: 0,
            error_message: None,
            created_at: now,
            completed_at: None,
        };
        uow.import_sessions.insert(session.id, session.clone());
        uow.import_sources.insert(session.id, content.to_string());
        record_create(
            &mut uow,
            ledger_id,
            ENTITY_IMPORT_SESSION,
            session.id,
            snapshot(&session),
        );
        uow.commit();
        info!(session_id = %session.id, rows = rows.len(), "created import preview");

        let is_valid = errors.is_empty();
        let sample: Vec<ParsedTransaction> = rows
            .iter()
            .take(self.config.preview_sample_rows)
            .cloned()
            .collect();
        Ok(ImportPreview {
            session_id: session.id,
            total_count: rows.len(),
            date_range,
            sample,
            duplicates,
            account_mappings,
            validation_errors: errors,
            is_valid,
        })
    }

    /// Phase 2: re-parse the retained source and post everything in one
    /// unit. Any failure rolls the unit back, marks the session FAILED,
    /// and guarantees the ledger's transaction and account counts are
    /// untouched.
    pub async fn execute(
        &self,
        user_id: UserId,
        session_id: ImportSessionId,
        final_mappings: Vec<AccountMapping>,
        skip_row_numbers: Vec<usize>,
    ) -> ImportResult<ExecuteOutcome> {
        let mut uow = self.store.unit_of_work().await;
        let session = uow
            .import_sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(format!("import session {session_id}")))?;
        owned_ledger(&uow, user_id, session.ledger_id)?;
        if session.status != ImportStatus::Pending {
            return Err(ImportError::Validation(format!(
                "import session is {:?}, expected PENDING",
                session.status
            )));
        }

        let Some(source) = uow.import_sources.get(&session_id).cloned() else {
            drop(uow);
            self.mark_failed(session_id, "import source is no longer available")
                .await;
            return Err(ImportError::ImportExpired);
        };

        let parser = match select_parser(session.import_type, session.bank_code.as_deref()) {
            Ok(parser) => parser,
            Err(err) => {
                drop(uow);
                self.mark_failed(session_id, &err.to_string()).await;
                return Err(err);
            }
        };
        let (mut rows, errors) = parser.parse(&source);
        self.enrich_categories(&mut rows).await;

        match apply_rows(
            &mut uow,
            &session,
            &rows,
            &errors,
            &final_mappings,
            &skip_row_numbers,
        ) {
            Ok(outcome) => {
                uow.commit();
                info!(
                    session_id = %session_id,
                    imported = outcome.session.imported_count,
                    "import completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                drop(uow);
                warn!(session_id = %session_id, error = %err, "import rolled back");
                self.mark_failed(session_id, &err.to_string()).await;
                Err(err)
            }
        }
    }

    pub async fn get_session(
        &self,
        user_id: UserId,
        session_id: ImportSessionId,
    ) -> ImportResult<ImportSession> {
        let state = self.store.read().await;
        let session = state
            .import_sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(format!("import session {session_id}")))?;
        owned_ledger(&state, user_id, session.ledger_id)?;
        Ok(session)
    }

    /// Import history for a ledger, newest first.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> ImportResult<Vec<ImportSession>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let mut sessions: Vec<ImportSession> = state
            .import_sessions
            .values()
            .filter(|session| session.ledger_id == ledger_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Drop the retained source for a session, as scratch-storage cleanup
    /// would. A later execute fails with `ImportExpired`.
    pub async fn expire_source(&self, session_id: ImportSessionId) {
        let mut uow = self.store.unit_of_work().await;
        uow.import_sources.remove(&session_id);
        uow.commit();
    }

    async fn enrich_categories(&self, rows: &mut [ParsedTransaction]) {
        for row in rows.iter_mut() {
            if !row.to_account.is_unresolved() {
                continue;
            }
            let mut suggestion = self.suggester.suggest(&row.description);
            if let Some(enhancer) = &self.enhancer {
                suggestion = enhancer.enhance(&row.description, suggestion).await;
            }
            row.category_suggestion = Some(suggestion);
        }
    }

    /// The failure itself must be durable even though the import unit
    /// rolled back, so it gets its own small unit. No audit row: failed
    /// mutations leave none.
    async fn mark_failed(&self, session_id: ImportSessionId, message: &str) {
        let mut uow = self.store.unit_of_work().await;
        if let Some(session) = uow.import_sessions.get_mut(&session_id) {
            session.status = ImportStatus::Failed;
            session.error_message = Some(message.to_string());
        }
        uow.commit();
    }
}

fn owned_ledger(state: &State, user_id: UserId, ledger_id: LedgerId) -> ImportResult<()> {
    state
        .ledgers
        .get(&ledger_id)
        .filter(|ledger| ledger.user_id == user_id)
        .map(|_| ())
        .ok_or_else(|| ImportError::NotFound(format!("ledger {ledger_id}")))
}

fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn select_parser(
    import_type: ImportType,
    bank_code: Option<&str>,
) -> ImportResult<Box<dyn StatementParser>> {
    match import_type {
        ImportType::MyabCsv => Ok(Box::new(MyabCsvParser)),
        ImportType::BankRecord => Ok(Box::new(BankRecordParser)),
        ImportType::CreditCard | ImportType::GmailCc => {
            let code = bank_code.ok_or_else(|| {
                ImportError::Validation("bank_code is required for credit-card imports".into())
            })?;
            let config = bank_config(code).ok_or_else(|| {
                ImportError::Validation(format!("unsupported bank code: {code}"))
            })?;
            Ok(Box::new(CreditCardParser::new(config)))
        }
    }
}

/// Mapping key: the leaf name a row's side resolves to plus its type. The
/// suggester's category stands in for unresolved credit-card targets.
fn side_key(row: &ParsedTransaction, to_side: bool) -> (String, AccountType, Vec<String>) {
    let path = if to_side { &row.to_account } else { &row.from_account };
    if to_side && path.is_unresolved() {
        let name = row
            .category_suggestion
            .as_ref()
            .map_or_else(|| "其他支出".to_string(), |suggestion| suggestion.name.clone());
        return (name.clone(), path.account_type, vec![name]);
    }
    (
        path.leaf_name().to_string(),
        path.account_type,
        path.segments.clone(),
    )
}

fn propose_mappings(
    state: &State,
    ledger_id: LedgerId,
    rows: &[ParsedTransaction],
) -> Vec<AccountMapping> {
    let mut mappings: BTreeMap<(String, String), AccountMapping> = BTreeMap::new();
    for row in rows {
        for to_side in [false, true] {
            let (name, account_type, segments) = side_key(row, to_side);
            let key = (name.clone(), account_type.to_string());
            if mappings.contains_key(&key) {
                continue;
            }
            let existing = state.accounts.values().find(|account| {
                account.ledger_id == ledger_id
                    && !account.is_archived
                    && account.account_type == account_type
                    && account.name == name
                    && !state.has_child_accounts(account.id)
            });
            mappings.insert(
                key,
                AccountMapping {
                    source_name: name.clone(),
                    account_type,
                    path_segments: segments,
                    account_id: existing.map(|account| account.id),
                    create_new: existing.is_none(),
                    suggested_name: existing.is_none().then_some(name),
                },
            );
        }
    }
    mappings.into_values().collect()
}

fn detect_duplicates(
    state: &State,
    ledger_id: LedgerId,
    rows: &[ParsedTransaction],
    mappings: &[AccountMapping],
) -> Vec<DuplicateWarning> {
    let resolve = |row: &ParsedTransaction, to_side: bool| -> Option<AccountId> {
        let (name, account_type, _) = side_key(row, to_side);
        mappings
            .iter()
            .find(|mapping| mapping.source_name == name && mapping.account_type == account_type)
            .and_then(|mapping| mapping.account_id)
    };

    let mut warnings = Vec::new();
    for row in rows {
        let (Some(from_id), Some(to_id)) = (resolve(row, false), resolve(row, true)) else {
            continue;
        };
        let matches: Vec<TransactionId> = state
            .transactions
            .values()
            .filter(|tx| {
                tx.ledger_id == ledger_id
                    && tx.date == row.date
                    && tx.amount == row.amount
                    && tx.from_account_id == from_id
                    && tx.to_account_id == to_id
            })
            .map(|tx| tx.id)
            .collect();
        if !matches.is_empty() {
            warnings.push(DuplicateWarning {
                row_number: row.row_number,
                existing_transaction_ids: matches,
                reason: "same date, amount, and accounts".into(),
            });
        }
    }
    warnings
}

fn date_range_of(rows: &[ParsedTransaction]) -> (NaiveDate, NaiveDate) {
    let today = Utc::now().date_naive();
    let min = rows.iter().map(|row| row.date).min().unwrap_or(today);
    let max = rows.iter().map(|row| row.date).max().unwrap_or(today);
    (min, max)
}

/// The transactional body of execute: materialize `create_new` mappings,
/// post every non-skipped row, and complete the session — all against the
/// unit's working state.
fn apply_rows(
    state: &mut State,
    session: &ImportSession,
    rows: &[ParsedTransaction],
    errors: &[RowError],
    final_mappings: &[AccountMapping],
    skip_row_numbers: &[usize],
) -> ImportResult<ExecuteOutcome> {
    let ledger_id = session.ledger_id;
    let mut created_accounts = Vec::new();
    let mut resolved: BTreeMap<(String, String), AccountId> = BTreeMap::new();

    for mapping in final_mappings {
        let key = (mapping.source_name.clone(), mapping.account_type.to_string());
        let account_id = match (mapping.account_id, mapping.create_new) {
            (Some(account_id), _) => account_id,
            (None, true) => {
                let segments = if mapping.path_segments.is_empty() {
                    vec![mapping
                        .suggested_name
                        .clone()
                        .unwrap_or_else(|| mapping.source_name.clone())]
                } else {
                    mapping.path_segments.clone()
                };
                ensure_account_path(
                    state,
                    ledger_id,
                    mapping.account_type,
                    &segments,
                    &mut created_accounts,
                )?
            }
            (None, false) => {
                return Err(ImportError::Validation(format!(
                    "mapping for '{}' resolves to no account",
                    mapping.source_name
                )));
            }
        };
        resolved.insert(key, account_id);
    }

    let mut imported = 0;
    let mut skipped = 0;
    let now = Utc::now();
    for row in rows {
        if skip_row_numbers.contains(&row.row_number) {
            skipped += 1;
            continue;
        }
        let from_id = lookup(&resolved, row, false)?;
        let to_id = lookup(&resolved, row, true)?;
        validate_posting(state, ledger_id, row.amount, from_id, to_id, row.transaction_type)?;
        let tx = Transaction {
            id: Uuid::new_v4(),
            ledger_id,
            date: row.date,
            description: row.description.clone(),
            amount: row.amount,
            from_account_id: from_id,
            to_account_id: to_id,
            transaction_type: row.transaction_type,
            notes: None,
            amount_expression: None,
            recurring_template_id: None,
            installment_plan_id: None,
            installment_number: None,
            source_channel: None,
            channel_message_id: None,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.transactions.insert(tx.id, tx);
        imported += 1;
    }

    let mut completed = session.clone();
    completed.status = ImportStatus::Completed;
    completed.imported_count = imported;
    completed.skipped_count = skipped;
    completed.error_count = errors.len() as i32;
    completed.created_accounts_count = created_accounts.len() as i32;
    completed.progress_current = completed.progress_total;
    completed.completed_at = Some(now);
    state.import_sessions.insert(completed.id, completed.clone());
    record_update(
        state,
        ledger_id,
        ENTITY_IMPORT_SESSION,
        completed.id,
        snapshot(session),
        snapshot(&completed),
    );

    Ok(ExecuteOutcome {
        session: completed,
        created_accounts,
    })
}

fn lookup(
    resolved: &BTreeMap<(String, String), AccountId>,
    row: &ParsedTransaction,
    to_side: bool,
) -> ImportResult<AccountId> {
    let (name, account_type, _) = side_key(row, to_side);
    resolved
        .get(&(name.clone(), account_type.to_string()))
        .copied()
        .ok_or_else(|| {
            ImportError::Validation(format!("required mapping for '{name}' is missing"))
        })
}

/// Find-or-create the account chain for a dotted path, honoring the depth
/// cap; freshly created rows are appended to `created`.
fn ensure_account_path(
    state: &mut State,
    ledger_id: LedgerId,
    account_type: AccountType,
    segments: &[String],
    created: &mut Vec<Account>,
) -> ImportResult<AccountId> {
    if segments.is_empty() {
        return Err(ImportError::Validation("account path cannot be empty".into()));
    }
    if segments.len() > MAX_ACCOUNT_DEPTH as usize {
        return Err(ImportError::Validation(format!(
            "account path deeper than {MAX_ACCOUNT_DEPTH} levels"
        )));
    }

    let mut parent: Option<AccountId> = None;
    let mut current = None;
    for (level, segment) in segments.iter().enumerate() {
        let existing = state
            .accounts
            .values()
            .find(|account| {
                account.ledger_id == ledger_id
                    && !account.is_archived
                    && account.account_type == account_type
                    && account.name == *segment
                    && account.parent_id == parent
            })
            .map(|account| account.id);
        let account_id = match existing {
            Some(account_id) => account_id,
            None => {
                let sort_order = state
                    .accounts
                    .values()
                    .filter(|account| {
                        account.ledger_id == ledger_id && account.parent_id == parent
                    })
                    .map(|account| account.sort_order)
                    .max()
                    .unwrap_or(0)
                    + SORT_ORDER_GAP;
                let now = Utc::now();
                let account = Account {
                    id: Uuid::new_v4(),
                    ledger_id,
                    name: segment.clone(),
                    account_type,
                    balance_cache: Decimal::ZERO,
                    is_system: false,
                    parent_id: parent,
                    depth: (level + 1) as i32,
                    sort_order,
                    is_archived: false,
                    archived_at: None,
                    created_at: now,
                    updated_at: now,
                };
                state.accounts.insert(account.id, account.clone());
                created.push(account.clone());
                account.id
            }
        };
        parent = Some(account_id);
        current = Some(account_id);
    }
    current.ok_or_else(|| ImportError::Internal("empty account path slipped through".into()))
}
