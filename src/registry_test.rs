use super::*;
use serde_json::json;

struct Doubler;

#[async_trait::async_trait]
impl Service for Doubler {
    async fn call(&self, data: Value) -> Result<Value, Value> {
        data.as_f64()
            .map(|n| json!(n * 2.0))
            .ok_or_else(|| json!("not a number"))
    }
}

#[tokio::test]
async fn closures_are_services() {
    let echo: Arc<dyn Service> = Arc::new(|data: Value| async move { Ok::<_, Value>(data) });
    assert_eq!(echo.call(json!({"a": 1})).await, Ok(json!({"a": 1})));
}

#[tokio::test]
async fn trait_objects_report_errors_as_values() {
    let svc: Arc<dyn Service> = Arc::new(Doubler);
    assert_eq!(svc.call(json!(2.5)).await, Ok(json!(5.0)));
    assert_eq!(svc.call(json!("x")).await, Err(json!("not a number")));
}

#[tokio::test]
async fn insert_replaces_previous_handler() {
    let mut table = HandlerTable::new();
    table.insert("math", Arc::new(Doubler));
    table.insert("math", Arc::new(|_: Value| async { Err::<Value, _>(json!("replaced")) }));

    let handler = table.get("math").expect("handler");
    assert_eq!(handler.call(json!(1.0)).await, Err(json!("replaced")));
    assert_eq!(table.len(), 1);
}

#[test]
fn remove_and_names() {
    let mut table = HandlerTable::new();
    table.insert("b", Arc::new(Doubler));
    table.insert("a", Arc::new(Doubler));
    assert_eq!(table.names().collect::<Vec<_>>(), vec!["a", "b"]);

    assert!(table.remove("a"));
    assert!(!table.remove("a"));
    assert!(table.get("a").is_none());
    assert!(!table.is_empty());
}
