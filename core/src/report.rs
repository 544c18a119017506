//! Dashboard reports.
//!
//! Each [`Report`] is a SQL template over a [`FilterContext`], a rule that
//! shapes the returned rows, and the empty body it degrades to. All six run
//! through [`run_report`].

use serde::Serialize;
use serde_json::Value;

use crate::error::LeadsError;
use crate::filter::{build_query_context, FilterContext, LeadFilters, LeadTable};
use crate::store::{LeadStore, Row};

/// Colors handed to the origin pie, cycled in result order.
pub const ORIGIN_PALETTE: [&str; 5] = ["#06b6d4", "#10b981", "#f59e0b", "#8b5cf6", "#ef4444"];

pub const UNKNOWN_CHANNEL: &str = "Desconhecido";
pub const LIST_LIMIT: usize = 100;
pub const DECLINE_REASON_LIMIT: usize = 5;

const SCHEDULED: &str = "CASE WHEN agendou = 'Sim' THEN 1 ELSE 0 END";
const PENDING: &str = "CASE WHEN agendou = 'Pendente' THEN 1 ELSE 0 END";
const DECLINED_WITH_REASON: &str = "agendou = 'Não' AND motivo_nao_agendou IS NOT NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Leads,
    Metrics,
    Timeline,
    Origin,
    Conversion,
    DeclineReasons,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ReportBody {
    Leads(Vec<Row>),
    Metrics(Metrics),
    Timeline(Vec<TimelinePoint>),
    Origin(Vec<OriginSlice>),
    Conversion(Vec<ConversionRate>),
    DeclineReasons(Vec<ReasonCount>),
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_leads: i64,
    pub total_agendados: i64,
    pub total_pendentes: i64,
    pub taxa_conversao: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TimelinePoint {
    pub name: Option<String>,
    pub value: i64,
    pub converted: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OriginSlice {
    pub name: Option<String>,
    pub value: i64,
    pub fill: &'static str,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConversionRate {
    pub name: String,
    pub value: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReasonCount {
    pub name: String,
    pub value: i64,
}

impl Metrics {
    pub fn from_counts(total_leads: i64, total_agendados: i64, total_pendentes: i64) -> Self {
        let taxa_conversao = if total_leads > 0 {
            total_agendados as f64 / total_leads as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_leads,
            total_agendados,
            total_pendentes,
            taxa_conversao,
        }
    }
}

impl ReportBody {
    pub(crate) fn len(&self) -> usize {
        match self {
            ReportBody::Leads(rows) => rows.len(),
            ReportBody::Metrics(_) => 1,
            ReportBody::Timeline(points) => points.len(),
            ReportBody::Origin(slices) => slices.len(),
            ReportBody::Conversion(rates) => rates.len(),
            ReportBody::DeclineReasons(reasons) => reasons.len(),
        }
    }
}

impl Report {
    pub const ALL: [Report; 6] = [
        Report::Leads,
        Report::Metrics,
        Report::Timeline,
        Report::Origin,
        Report::Conversion,
        Report::DeclineReasons,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Report::Leads => "leads",
            Report::Metrics => "metrics",
            Report::Timeline => "timeline",
            Report::Origin => "origem",
            Report::Conversion => "conversao",
            Report::DeclineReasons => "motivos-recusa",
        }
    }

    /// Body of the 500 response when errors are surfaced.
    pub fn failure_message(self) -> &'static str {
        match self {
            Report::Leads => "Erro interno ao buscar leads",
            Report::Metrics => "Erro ao buscar métricas",
            Report::Timeline => "Erro ao buscar timeline",
            Report::Origin => "Erro ao buscar origem",
            Report::Conversion => "Erro ao buscar conversão",
            Report::DeclineReasons => "Erro ao buscar motivos de recusa",
        }
    }

    pub fn fallback(self) -> ReportBody {
        match self {
            Report::Leads => ReportBody::Leads(Vec::new()),
            Report::Metrics => ReportBody::Metrics(Metrics::default()),
            Report::Timeline => ReportBody::Timeline(Vec::new()),
            Report::Origin => ReportBody::Origin(Vec::new()),
            Report::Conversion => ReportBody::Conversion(Vec::new()),
            Report::DeclineReasons => ReportBody::DeclineReasons(Vec::new()),
        }
    }

    pub fn sql(self, ctx: &FilterContext) -> String {
        let table = ctx.table.name();
        let date = ctx.date_column;
        let filter = ctx.where_sql.as_str();

        match self {
            Report::Leads => {
                let select = format!("SELECT * FROM {table}");
                let order = match ctx.table {
                    LeadTable::Contatos => format!("ORDER BY {date} DESC, sequencia_dia ASC"),
                    LeadTable::Leads => format!("ORDER BY {date} DESC"),
                };
                let limit = format!("LIMIT {LIST_LIMIT}");
                statement(&[select.as_str(), filter, order.as_str(), limit.as_str()])
            }
            Report::Metrics => {
                let select = format!(
                    "SELECT COUNT(*) AS \"totalLeads\", \
                     SUM({SCHEDULED}) AS \"totalAgendados\", \
                     SUM({PENDING}) AS \"totalPendentes\" \
                     FROM {table}"
                );
                statement(&[select.as_str(), filter])
            }
            Report::Timeline => {
                let select = format!(
                    "SELECT TO_CHAR(DATE({date}), 'MM/DD') AS name, \
                     COUNT(*) AS value, \
                     SUM({SCHEDULED}) AS converted \
                     FROM {table}"
                );
                let group = format!("GROUP BY DATE({date}) ORDER BY DATE({date}) ASC");
                statement(&[select.as_str(), filter, group.as_str()])
            }
            Report::Origin => {
                let select =
                    format!("SELECT como_nos_conheceu AS name, COUNT(*) AS value FROM {table}");
                statement(&[
                    select.as_str(),
                    filter,
                    "GROUP BY como_nos_conheceu ORDER BY value DESC",
                ])
            }
            Report::Conversion => {
                let select = format!(
                    "SELECT como_nos_conheceu AS name, \
                     COUNT(*) AS total, \
                     SUM({SCHEDULED}) AS agendados \
                     FROM {table}"
                );
                statement(&[select.as_str(), filter, "GROUP BY como_nos_conheceu"])
            }
            Report::DeclineReasons => {
                let select =
                    format!("SELECT motivo_nao_agendou AS name, COUNT(*) AS value FROM {table}");
                let declined = ctx.and_where(DECLINED_WITH_REASON);
                let group = format!(
                    "GROUP BY motivo_nao_agendou ORDER BY value DESC LIMIT {DECLINE_REASON_LIMIT}"
                );
                statement(&[select.as_str(), declined.as_str(), group.as_str()])
            }
        }
    }

    pub fn shape(self, rows: Vec<Row>, ctx: &FilterContext) -> ReportBody {
        match self {
            Report::Leads => ReportBody::Leads(
                rows.into_iter()
                    .map(|row| normalize_contact_date(row, ctx.date_column))
                    .collect(),
            ),
            Report::Metrics => ReportBody::Metrics(
                rows.first()
                    .map(|row| {
                        Metrics::from_counts(
                            count(row, "totalLeads"),
                            count(row, "totalAgendados"),
                            count(row, "totalPendentes"),
                        )
                    })
                    .unwrap_or_default(),
            ),
            Report::Timeline => ReportBody::Timeline(
                rows.iter()
                    .map(|row| TimelinePoint {
                        name: text(row, "name"),
                        value: count(row, "value"),
                        converted: count(row, "converted"),
                    })
                    .collect(),
            ),
            Report::Origin => ReportBody::Origin(
                rows.iter()
                    .enumerate()
                    .map(|(i, row)| OriginSlice {
                        name: text(row, "name"),
                        value: count(row, "value"),
                        fill: ORIGIN_PALETTE[i % ORIGIN_PALETTE.len()],
                    })
                    .collect(),
            ),
            Report::Conversion => {
                let mut rates: Vec<ConversionRate> = rows
                    .iter()
                    .map(|row| {
                        let total = count(row, "total");
                        let value = if total > 0 {
                            round_tenth(count(row, "agendados") as f64 / total as f64 * 100.0)
                        } else {
                            0.0
                        };
                        ConversionRate {
                            name: text(row, "name")
                                .filter(|n| !n.is_empty())
                                .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string()),
                            value,
                        }
                    })
                    .collect();
                // stable: equal rates keep the store's order
                rates.sort_by(|a, b| b.value.total_cmp(&a.value));
                ReportBody::Conversion(rates)
            }
            Report::DeclineReasons => ReportBody::DeclineReasons(
                rows.iter()
                    .filter_map(|row| {
                        Some(ReasonCount {
                            name: text(row, "name")?,
                            value: count(row, "value"),
                        })
                    })
                    .take(DECLINE_REASON_LIMIT)
                    .collect(),
            ),
        }
    }
}

pub async fn run_report(
    store: &dyn LeadStore,
    report: Report,
    filters: &LeadFilters,
) -> Result<ReportBody, LeadsError> {
    let ctx = build_query_context(filters);
    let sql = report.sql(&ctx);
    tracing::debug!(
        report = report.name(),
        table = ctx.table.name(),
        params = ctx.params.len(),
        %sql,
        "running report"
    );

    let rows = store.fetch(&sql, &ctx.params).await?;
    let body = report.shape(rows, &ctx);

    tracing::info!(
        report = report.name(),
        table = ctx.table.name(),
        rows = body.len(),
        "report ready"
    );
    Ok(body)
}

fn statement(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exposes the table's own date column as `data_contato`.
fn normalize_contact_date(mut row: Row, date_column: &str) -> Row {
    let date = row
        .get(date_column)
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .cloned();
    if let Some(date) = date {
        row.insert("data_contato".to_string(), date);
    }
    row
}

/// Counts arrive as JSON numbers, numeric strings or null.
fn count(row: &Row, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map_or(0, |f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_or(0, |f| f as i64),
        _ => 0,
    }
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
