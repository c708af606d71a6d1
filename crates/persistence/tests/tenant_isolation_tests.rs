//! Tenant isolation tests.
//!
//! Every indexed query must carry the caller's tenant as an exact-match
//! constraint, and no operation may return another tenant's records.

mod common;

use serde_json::{Value, json};

use helios_dal::compiler::{Dialect, NativeFilter};
use helios_dal::error::{DalError, ValidationError};
use helios_dal::marshal::AttributeValue;
use helios_dal::repository::IndexQuery;

use common::*;

/// Returns `true` if the compiled payload binds `tenantId` to `tenant`.
fn carries_tenant(native: &NativeFilter, tenant: &str) -> bool {
    match native {
        NativeFilter::Expression(q) => {
            let alias = q
                .expression_attribute_names
                .iter()
                .find(|(_, name)| name.as_str() == "tenantId")
                .map(|(alias, _)| alias.clone());
            let bound = q
                .expression_attribute_values
                .values()
                .any(|v| *v == AttributeValue::S(tenant.to_string()));
            let in_text = alias.is_some_and(|alias| {
                q.key_condition_expression.iter().chain(q.filter_expression.iter()).any(|text| {
                    text.contains(&format!("{} = :", alias))
                })
            });
            bound && in_text
        }
        NativeFilter::Document(q) => {
            let text = q.filter.to_string();
            text.contains(&format!(r#""tenantId":{{"$eq":"{}"}}"#, tenant))
        }
        NativeFilter::Selector(q) => {
            q.query.contains(r#"c["tenantId"] = @p"#) && q.parameters.iter().any(|p| p.value == json!(tenant))
        }
        NativeFilter::Statement(q) => {
            q.statement.contains(r#""tenantId" = ?"#) && q.parameters.contains(&AttributeValue::S(tenant.to_string()))
        }
    }
}

fn queries() -> Vec<IndexQuery> {
    vec![
        IndexQuery::new("byStatus", "open"),
        IndexQuery::new("byStatus", "open").with_sort_key(json!({"gte": "2024-01-03"})),
        IndexQuery::new("byCustomer", "c-2"),
        IndexQuery::new("byTenant", "acme"),
        IndexQuery::new("byTenant", "acme").with_sort_key(json!({"lt": "2024-01-05"})),
        IndexQuery::new("byStatus", "open")
            .with_filter_json(&json!({"$or": [{"tenantId": "globex"}, {"amount": {"gt": 0}}]}))
            .unwrap(),
    ]
}

// ============================================================================
// Compiled Constraint
// ============================================================================

#[test]
fn test_every_compiled_query_carries_tenant() {
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        for query in queries() {
            let compiled = ctx.repo.compile(&tenant("acme"), &query).unwrap();
            assert!(
                carries_tenant(&compiled.native, "acme"),
                "{} {} missing tenant: {:?}",
                dialect,
                query.index_name(),
                compiled.native
            );
        }
    }
}

#[test]
fn test_tenant_index_folds_tenant_into_key() {
    let ctx = TestContext::new(Dialect::Expression);
    let compiled = ctx
        .repo
        .compile(&tenant("acme"), &IndexQuery::new("byTenant", "acme"))
        .unwrap();
    match compiled.native {
        NativeFilter::Expression(q) => {
            assert!(q.filter_expression.is_none(), "no residual expected: {:?}", q.filter_expression);
            assert!(q.key_condition_expression.is_some());
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn test_selector_routes_tenant_index_to_one_partition() {
    let ctx = TestContext::new(Dialect::Selector);
    let compiled = ctx
        .repo
        .compile(&tenant("acme"), &IndexQuery::new("byTenant", "acme"))
        .unwrap();
    match compiled.native {
        NativeFilter::Selector(q) => assert_eq!(q.partition_key, Some(json!("acme"))),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_tenant_index_with_other_tenant_is_rejected() {
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        ctx.seed(&standard_orders()).await;

        let err = ctx
            .repo
            .query_by_index(&tenant("acme"), &IndexQuery::new("byTenant", "globex"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DalError::Validation(ValidationError::TenantScopeConflict { .. })
        ));
        assert!(err.is_compile_time());
        assert_eq!(ctx.store.stats().query_calls, 0, "{}", dialect);
    }
}

// ============================================================================
// Query Results
// ============================================================================

#[tokio::test]
async fn test_no_cross_tenant_rows_in_any_dialect() {
    let fixtures = standard_orders();
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        ctx.seed(&fixtures).await;

        for (who, prefix) in [("acme", "a-"), ("globex", "g-")] {
            for query in queries() {
                // `byTenant` queries name acme explicitly.
                if query.index_name() == "byTenant" && who != "acme" {
                    continue;
                }
                let found = ctx.repo.query_by_index(&tenant(who), &query).await.unwrap();
                for record in &found {
                    assert_eq!(record["tenantId"], Value::from(who), "{} {}", dialect, query.index_name());
                    assert!(record["id"].as_str().is_some_and(|id| id.starts_with(prefix)));
                }
            }
        }
    }
}

#[tokio::test]
async fn test_same_index_value_different_tenants() {
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        ctx.seed(&standard_orders()).await;
        let query = IndexQuery::new("byStatus", "open");

        let acme = ctx.repo.query_by_index(&tenant("acme"), &query).await.unwrap();
        let globex = ctx.repo.query_by_index(&tenant("globex"), &query).await.unwrap();

        assert_eq!(ids(&acme), vec!["a-01", "a-02", "a-03", "a-05", "a-06", "a-08", "a-09"], "{}", dialect);
        assert_eq!(ids(&globex), vec!["g-01", "g-02", "g-04"], "{}", dialect);
    }
}

#[tokio::test]
async fn test_filter_naming_other_tenant_matches_nothing() {
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        ctx.seed(&standard_orders()).await;
        let query = IndexQuery::new("byStatus", "open")
            .with_filter_json(&json!({"tenantId": "globex"}))
            .unwrap();

        let found = ctx.repo.query_by_index(&tenant("acme"), &query).await.unwrap();
        assert!(found.is_empty(), "{}", dialect);
    }
}

#[tokio::test]
async fn test_paged_cursor_stays_in_tenant() {
    let ctx = TestContext::new(Dialect::Expression);
    ctx.seed(&standard_orders()).await;
    let query = IndexQuery::new("byStatus", "open").with_limit(2);

    let acme_first = ctx
        .repo
        .query_by_index_paginated(&tenant("acme"), &query, None)
        .await
        .unwrap();
    let cursor = acme_first.next_page_hash().unwrap().to_string();

    // A cursor issued to acme does not expose acme rows to globex.
    let globex = ctx
        .repo
        .query_by_index_paginated(&tenant("globex"), &query, Some(&cursor))
        .await
        .unwrap();
    assert!(globex.items.iter().all(|r| r["tenantId"] == "globex"));
}

// ============================================================================
// Single-record Access
// ============================================================================

#[tokio::test]
async fn test_save_stamps_and_guards_tenant() {
    let ctx = TestContext::new(Dialect::Document);
    let saved = ctx
        .repo
        .save(&tenant("acme"), OrderFixture::new("x-1", "acme", "2024-02-01").to_record())
        .await
        .unwrap();
    assert_eq!(saved["tenantId"], "acme");

    let mut foreign = OrderFixture::new("x-2", "globex", "2024-02-01").to_record();
    foreign.insert("amount".into(), json!(1));
    let err = ctx.repo.save(&tenant("acme"), foreign).await.unwrap_err();
    assert!(matches!(err, DalError::Validation(ValidationError::RecordRejected { .. })));

    let mut unstamped = OrderFixture::new("x-3", "acme", "2024-02-01").to_record();
    unstamped.remove("tenantId");
    let saved = ctx.repo.save(&tenant("globex"), unstamped).await.unwrap();
    assert_eq!(saved["tenantId"], "globex");
}

#[tokio::test]
async fn test_get_and_delete_respect_ownership() {
    for dialect in Dialect::ALL {
        let ctx = TestContext::new(dialect);
        ctx.seed(&standard_orders()).await;

        assert!(ctx.repo.get_by_id(&tenant("globex"), "a-01").await.unwrap().is_none());
        assert!(!ctx.repo.delete_by_id(&tenant("globex"), "a-01").await.unwrap());
        assert!(ctx.repo.get_by_id(&tenant("acme"), "a-01").await.unwrap().is_some());

        assert!(ctx.repo.delete_by_id(&tenant("acme"), "a-01").await.unwrap());
        assert!(ctx.repo.get_by_id(&tenant("acme"), "a-01").await.unwrap().is_none(), "{}", dialect);
    }
}
