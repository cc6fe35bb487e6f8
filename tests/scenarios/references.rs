//! Test: reference resolution and join/aggregate properties over files

use crate::helpers::*;
use datapipe::core::{check_steps, PipelineRequest};
use datapipe::error::ErrorKind;
use serde_json::json;

/// Pipelines that only read names produced by earlier steps, in several shapes
fn well_ordered(fixture: &Fixture) -> Vec<serde_json::Value> {
    let orders = fixture.orders();
    let users = fixture.users();
    vec![
        json!([
            {"op": "read_tabular_csv", "name": "o", "path": orders}
        ]),
        json!([
            {"op": "read_tabular_json", "name": "u", "path": users},
            {"op": "read_tabular_csv", "name": "o", "path": orders},
            {"op": "normalize_text_fields", "input": "o"},
            {"op": "normalize_text_fields", "input": "u"}
        ]),
        json!([
            {"op": "read_tabular_json", "name": "u", "path": users},
            {"op": "read_tabular_csv", "name": "o", "path": orders},
            {"op": "join", "left": "u", "right": "o", "on": "user_id"},
            {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount"}
        ]),
        json!([
            {"op": "read_tabular_csv", "name": "o", "path": orders},
            {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount", "source": "o"},
            {"op": "normalize_text_fields", "input": "result"},
            {"op": "write_sink_relational", "table": "out.averages"}
        ]),
    ]
}

#[tokio::test]
async fn test_earlier_references_always_resolve() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    for pipeline in well_ordered(&fixture) {
        let pipeline = steps(pipeline);
        assert!(check_steps(&pipeline).is_empty());

        let result = engine.submit(PipelineRequest::from_steps(pipeline.clone())).await;
        if let Err(e) = &result {
            assert_ne!(e.kind(), ErrorKind::UnresolvedReference, "{:?}", pipeline);
        }
        assert!(result.is_ok(), "{:?}", result);
    }
}

#[tokio::test]
async fn test_forward_reference_is_caught_statically_and_at_runtime() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let pipeline = steps(json!([
        {"op": "normalize_text_fields", "input": "o"},
        {"op": "read_tabular_csv", "name": "o", "path": fixture.orders()}
    ]));

    let diagnostics = check_steps(&pipeline);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].index, 0);

    let err = engine.submit(PipelineRequest::from_steps(pipeline)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    assert_eq!(err.step_index(), Some(0));
}

#[tokio::test]
async fn test_join_ignores_input_row_order() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let shuffled_orders = fixture.write(
        "orders_shuffled.csv",
        "user_id,name,amount\n4,Dan,7.5\n2,Bob,5\n1,Ann,20\n3,Cid,\n1, Ann ,10\n",
    );
    let shuffled_users = fixture.write(
        "users_shuffled.jsonl",
        "{\"user_id\": 5, \"city\": \"Nowhere\"}\n{\"user_id\": 2, \"city\": \"Rome\"}\n\
         {\"user_id\": 1, \"city\": \"Oslo\"}\n{\"user_id\": 2, \"city\": \"Paris\"}\n",
    );

    let join = |orders: String, users: String| {
        steps(json!([
            {"op": "read_tabular_csv", "name": "o", "path": orders},
            {"op": "read_tabular_json", "name": "u", "path": users},
            {"op": "join", "left": "o", "right": "u", "on": "user_id"}
        ]))
    };

    let forward = engine
        .submit(PipelineRequest::from_steps(join(fixture.orders(), fixture.users())))
        .await
        .unwrap();
    let shuffled = engine
        .submit(PipelineRequest::from_steps(join(shuffled_orders, shuffled_users)))
        .await
        .unwrap();

    // 5 orders, user 2 matched twice
    assert_eq!(forward.preview.len(), 6);
    assert_eq!(sorted_rows(&forward.preview), sorted_rows(&shuffled.preview));
}

#[tokio::test]
async fn test_one_row_per_group_with_exact_means() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let sales = fixture.write(
        "sales.csv",
        "store,amount\nb,4\na,1\nb,6\nc,x\na,2\n,9\na,6\nb,\n",
    );

    let response = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "sales", "path": sales},
            {"op": "aggregate", "by": "store", "metric": "avg", "column": "amount", "source": "sales"}
        ]))))
        .await
        .unwrap();

    // the row without a store is dropped; "x" is not a number so c has no mean
    let stores: Vec<&serde_json::Value> = response.preview.iter().map(|r| &r["store"]).collect();
    assert_eq!(stores, vec![&json!("a"), &json!("b"), &json!("c")]);
    assert_eq!(response.preview[0]["avg_amount"], json!(3.0));
    assert_eq!(response.preview[1]["avg_amount"], json!(5.0));
    assert_eq!(response.preview[2]["avg_amount"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_padded_numbers_average_as_numbers() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let padded = fixture.write("padded.csv", "user_id,amount\n1, 10\n1,20\n 2 ,7\n");

    let response = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "padded", "path": padded},
            {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount", "source": "padded"}
        ]))))
        .await
        .unwrap();

    assert_eq!(response.preview.len(), 2);
    assert_eq!(response.preview[0]["user_id"], json!(1));
    assert_eq!(response.preview[0]["avg_amount"], json!(15.0));
    assert_eq!(response.preview[1]["user_id"], json!(2));
    assert_eq!(response.preview[1]["avg_amount"], json!(7.0));
}
