//! Tests for report SQL templates and row shaping

use serde_json::{json, Value};

use crate::filter::{build_query_context, FilterContext, LeadFilters};
use crate::report::{Metrics, Report, ReportBody, ORIGIN_PALETTE};
use crate::store::Row;

fn ctx(filters: LeadFilters) -> FilterContext {
    build_query_context(&filters)
}

fn snapshot() -> LeadFilters {
    LeadFilters {
        table: Some("leads_contatos".into()),
        ..LeadFilters::default()
    }
}

fn rows(values: Value) -> Vec<Row> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

// =============================================================================
// SQL
// =============================================================================

#[test]
fn test_list_sql_primary_table() {
    let sql = Report::Leads.sql(&ctx(LeadFilters::default()));
    assert_eq!(sql, "SELECT * FROM leads ORDER BY data_contato DESC LIMIT 100");
}

#[test]
fn test_list_sql_snapshot_table_orders_by_sequence() {
    let sql = Report::Leads.sql(&ctx(LeadFilters {
        nome: Some("jo".into()),
        ..snapshot()
    }));
    assert_eq!(
        sql,
        "SELECT * FROM leads_contatos WHERE nome ILIKE $1 \
         ORDER BY data_snapshot DESC, sequencia_dia ASC LIMIT 100"
    );
}

#[test]
fn test_metrics_sql() {
    let sql = Report::Metrics.sql(&ctx(LeadFilters {
        agendou: Some("Sim".into()),
        ..LeadFilters::default()
    }));
    assert!(sql.starts_with("SELECT COUNT(*) AS \"totalLeads\""));
    assert!(sql.contains("SUM(CASE WHEN agendou = 'Pendente' THEN 1 ELSE 0 END) AS \"totalPendentes\""));
    assert!(sql.ends_with("FROM leads WHERE agendou = $1"));
}

#[test]
fn test_timeline_sql_uses_table_date_column() {
    let sql = Report::Timeline.sql(&ctx(snapshot()));
    assert!(sql.contains("TO_CHAR(DATE(data_snapshot), 'MM/DD') AS name"));
    assert!(sql.ends_with(
        "FROM leads_contatos GROUP BY DATE(data_snapshot) ORDER BY DATE(data_snapshot) ASC"
    ));
}

#[test]
fn test_origin_and_conversion_sql() {
    let origin = Report::Origin.sql(&ctx(LeadFilters::default()));
    assert_eq!(
        origin,
        "SELECT como_nos_conheceu AS name, COUNT(*) AS value FROM leads \
         GROUP BY como_nos_conheceu ORDER BY value DESC"
    );

    let conversion = Report::Conversion.sql(&ctx(LeadFilters::default()));
    assert!(conversion.ends_with("FROM leads GROUP BY como_nos_conheceu"));
    assert!(!conversion.contains("ORDER BY"));
}

#[test]
fn test_decline_reasons_sql_without_filters() {
    let sql = Report::DeclineReasons.sql(&ctx(LeadFilters::default()));
    assert_eq!(
        sql,
        "SELECT motivo_nao_agendou AS name, COUNT(*) AS value FROM leads \
         WHERE agendou = 'Não' AND motivo_nao_agendou IS NOT NULL \
         GROUP BY motivo_nao_agendou ORDER BY value DESC LIMIT 5"
    );
}

#[test]
fn test_decline_reasons_sql_extends_filters() {
    let sql = Report::DeclineReasons.sql(&ctx(LeadFilters {
        start_date: Some("2024-01-01".into()),
        ..LeadFilters::default()
    }));
    assert!(sql.contains(
        "WHERE data_contato >= $1 AND agendou = 'Não' AND motivo_nao_agendou IS NOT NULL"
    ));
}

#[test]
fn test_every_report_keeps_placeholders_in_step_with_params() {
    let filters = LeadFilters {
        start_date: Some("2024-01-01".into()),
        end_date: Some("2024-01-31".into()),
        nome: Some("a".into()),
        telefone: Some("9".into()),
        agendou: Some("Não".into()),
        table: Some("leads_contatos".into()),
    };
    let ctx = ctx(filters);
    for report in Report::ALL {
        let sql = report.sql(&ctx);
        assert_eq!(sql.matches('$').count(), ctx.params.len(), "{}", report.name());
    }
}

// =============================================================================
// Shaping
// =============================================================================

#[test]
fn test_list_normalizes_snapshot_date() {
    let ctx = ctx(snapshot());
    let body = Report::Leads.shape(
        rows(json!([
            {"nome": "Ana", "data_snapshot": "2024-03-01T10:00:00.000Z", "sequencia_dia": 1},
            {"nome": "Bia", "data_snapshot": null, "data_contato": "2024-02-01"},
            {"nome": "Cris", "data_snapshot": null}
        ])),
        &ctx,
    );

    let ReportBody::Leads(list) = body else {
        panic!("expected list body");
    };
    assert_eq!(list[0]["data_contato"], json!("2024-03-01T10:00:00.000Z"));
    assert_eq!(list[0]["sequencia_dia"], json!(1));
    assert_eq!(list[1]["data_contato"], json!("2024-02-01"));
    assert!(!list[2].contains_key("data_contato"));
}

#[test]
fn test_metrics_from_row() {
    let body = Report::Metrics.shape(
        rows(json!([{"totalLeads": 8, "totalAgendados": 2, "totalPendentes": "3"}])),
        &ctx(LeadFilters::default()),
    );
    assert_eq!(
        body,
        ReportBody::Metrics(Metrics {
            total_leads: 8,
            total_agendados: 2,
            total_pendentes: 3,
            taxa_conversao: 25.0,
        })
    );
}

#[test]
fn test_metrics_empty_table_is_all_zero() {
    let body = Report::Metrics.shape(
        rows(json!([{"totalLeads": 0, "totalAgendados": null, "totalPendentes": null}])),
        &ctx(LeadFilters::default()),
    );
    assert_eq!(body, ReportBody::Metrics(Metrics::default()));
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({"totalLeads": 0, "totalAgendados": 0, "totalPendentes": 0, "taxaConversao": 0.0})
    );

    let no_rows = Report::Metrics.shape(Vec::new(), &ctx(LeadFilters::default()));
    assert_eq!(no_rows, ReportBody::Metrics(Metrics::default()));
}

#[test]
fn test_conversion_rate_stays_in_range() {
    for (total, scheduled) in [(1, 0), (1, 1), (3, 1), (7, 7), (1000, 999)] {
        let m = Metrics::from_counts(total, scheduled, 0);
        assert!((0.0..=100.0).contains(&m.taxa_conversao), "{total}/{scheduled}");
    }
    assert_eq!(Metrics::from_counts(0, 0, 0).taxa_conversao, 0.0);
}

#[test]
fn test_timeline_points() {
    let body = Report::Timeline.shape(
        rows(json!([
            {"name": "03/01", "value": 4, "converted": 1},
            {"name": "03/02", "value": "2", "converted": null}
        ])),
        &ctx(LeadFilters::default()),
    );
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!([
            {"name": "03/01", "value": 4, "converted": 1},
            {"name": "03/02", "value": 2, "converted": 0}
        ])
    );
}

#[test]
fn test_origin_cycles_palette() {
    let source: Vec<Value> = (0..7)
        .map(|i| json!({"name": format!("canal {i}"), "value": 10 - i}))
        .collect();
    let body = Report::Origin.shape(rows(Value::Array(source)), &ctx(LeadFilters::default()));

    let ReportBody::Origin(slices) = body else {
        panic!("expected origin body");
    };
    assert_eq!(slices.len(), 7);
    assert_eq!(slices[0].fill, ORIGIN_PALETTE[0]);
    assert_eq!(slices[4].fill, ORIGIN_PALETTE[4]);
    assert_eq!(slices[5].fill, ORIGIN_PALETTE[0]);
    assert_eq!(slices[6].fill, ORIGIN_PALETTE[1]);
    assert_eq!(slices[6].value, 4);
}

#[test]
fn test_conversion_sorted_by_rate_descending() {
    let body = Report::Conversion.shape(
        rows(json!([
            {"name": "Instagram", "total": 3, "agendados": 1},
            {"name": null, "total": 4, "agendados": 3},
            {"name": "Google", "total": 0, "agendados": 0},
            {"name": "Indicação", "total": 2, "agendados": 2},
            {"name": "Facebook", "total": 6, "agendados": 2}
        ])),
        &ctx(LeadFilters::default()),
    );

    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!([
            {"name": "Indicação", "value": 100.0},
            {"name": "Desconhecido", "value": 75.0},
            {"name": "Instagram", "value": 33.3},
            {"name": "Facebook", "value": 33.3},
            {"name": "Google", "value": 0.0}
        ])
    );
}

#[test]
fn test_decline_reasons_capped_and_non_null() {
    let body = Report::DeclineReasons.shape(
        rows(json!([
            {"name": "Preço", "value": 9},
            {"name": null, "value": 8},
            {"name": "Distância", "value": 7},
            {"name": "Horário", "value": 5},
            {"name": "Sem interesse", "value": 4},
            {"name": "Outro", "value": 2},
            {"name": "Concorrente", "value": 1}
        ])),
        &ctx(LeadFilters::default()),
    );

    let ReportBody::DeclineReasons(reasons) = body else {
        panic!("expected decline reasons body");
    };
    assert_eq!(reasons.len(), 5);
    assert_eq!(reasons[0].name, "Preço");
    assert_eq!(reasons[1].name, "Distância");
    assert_eq!(reasons[4].name, "Outro");
}

#[test]
fn test_fallback_bodies() {
    for report in Report::ALL {
        let fallback = serde_json::to_value(report.fallback()).unwrap();
        match report {
            Report::Metrics => assert_eq!(fallback["totalLeads"], json!(0)),
            _ => assert_eq!(fallback, json!([]), "{}", report.name()),
        }
    }
}
