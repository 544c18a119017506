//! Query-string filters and the WHERE clause built from them.
//!
//! Every report goes through [`build_query_context`]; it is the only place
//! request input is turned into SQL. Values only ever travel as bound
//! parameters, the table name only through [`LeadTable`].

use serde::Deserialize;

/// Sentinel for "no outcome filter" sent by the dashboard.
pub const ALL_OUTCOMES: &str = "Todos";

/// Filters accepted by every report endpoint.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub nome: Option<String>,
    pub telefone: Option<String>,
    pub agendou: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadTable {
    /// Primary table, one row per contact.
    Leads,
    /// Intra-day snapshots of lead state.
    Contatos,
}

impl LeadTable {
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("leads_contatos") => LeadTable::Contatos,
            _ => LeadTable::Leads,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LeadTable::Leads => "leads",
            LeadTable::Contatos => "leads_contatos",
        }
    }

    pub fn date_column(self) -> &'static str {
        match self {
            LeadTable::Leads => "data_contato",
            LeadTable::Contatos => "data_snapshot",
        }
    }
}

/// Table, date column, WHERE clause and bound values for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterContext {
    pub table: LeadTable,
    pub date_column: &'static str,
    pub where_sql: String,
    pub params: Vec<String>,
}

impl FilterContext {
    /// Appends a fixed, value-free condition to the clause.
    pub fn and_where(&self, condition: &str) -> String {
        if self.where_sql.is_empty() {
            format!("WHERE {condition}")
        } else {
            format!("{} AND {condition}", self.where_sql)
        }
    }
}

struct Conditions {
    parts: Vec<String>,
    params: Vec<String>,
}

impl Conditions {
    fn push(&mut self, column: &str, op: &str, value: String) {
        self.params.push(value);
        self.parts
            .push(format!("{column} {op} ${}", self.params.len()));
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub fn build_query_context(filters: &LeadFilters) -> FilterContext {
    let table = LeadTable::from_param(filters.table.as_deref());
    let date_column = table.date_column();

    let mut conditions = Conditions {
        parts: Vec::new(),
        params: Vec::new(),
    };

    if let Some(start) = present(&filters.start_date) {
        conditions.push(date_column, ">=", start.to_string());
    }

    if let Some(end) = present(&filters.end_date) {
        conditions.push(date_column, "<=", end.to_string());
    }

    // literal % and _ in the input stay wildcards
    if let Some(nome) = present(&filters.nome) {
        conditions.push("nome", "ILIKE", format!("%{nome}%"));
    }

    if let Some(telefone) = present(&filters.telefone) {
        conditions.push("telefone", "ILIKE", format!("%{telefone}%"));
    }

    if let Some(agendou) = present(&filters.agendou).filter(|v| *v != ALL_OUTCOMES) {
        conditions.push("agendou", "=", agendou.to_string());
    }

    let where_sql = if conditions.parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.parts.join(" AND "))
    };

    FilterContext {
        table,
        date_column,
        where_sql,
        params: conditions.params,
    }
}
