//! Airflow DAG export
//!
//! Renders a step list as a Python DAG file with one `PythonOperator` per
//! step, chained in order. The tasks only log their step; the file is a
//! starting point for porting a pipeline to Airflow.

use crate::core::StepSpec;

/// DAG id used when none is given
pub const DEFAULT_DAG_ID: &str = "generated_etl";

/// Schedule written into every exported DAG
pub const DAG_SCHEDULE: &str = "@daily";

/// Task id for the step at `index`: `step_{index}_{op}`
pub fn task_id(index: usize, step: &StepSpec) -> String {
    let op: String = step
        .op_name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("step_{}_{}", index, op)
}

/// Quote a string as a Python literal
fn py_str(s: &str) -> String {
    // JSON string escapes are valid Python escapes
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render `steps` as an Airflow DAG file
pub fn dag_from_steps(dag_id: &str, steps: &[StepSpec]) -> String {
    let mut lines = vec![
        "import json".to_string(),
        "from datetime import datetime".to_string(),
        String::new(),
        "from airflow import DAG".to_string(),
        "from airflow.operators.python import PythonOperator".to_string(),
        String::new(),
        String::new(),
        format!(
            "with DAG(dag_id={}, start_date=datetime(2024, 1, 1), schedule={}, catchup=False) as dag:",
            py_str(dag_id),
            py_str(DAG_SCHEDULE)
        ),
    ];

    if steps.is_empty() {
        lines.push("    pass".to_string());
    }

    for (i, step) in steps.iter().enumerate() {
        let params = serde_json::to_string(step.fields()).unwrap_or_else(|_| "{}".to_string());
        lines.push(String::new());
        lines.push(format!("    def _step_{}(**context):", i));
        lines.push(format!(
            "        print({}, json.loads({}))",
            py_str(&format!("Executing {} with params", step.op_name())),
            py_str(&params)
        ));
        lines.push(String::new());
        lines.push(format!(
            "    t{} = PythonOperator(task_id={}, python_callable=_step_{})",
            i,
            py_str(&task_id(i, step)),
            i
        ));
        if i > 0 {
            lines.push(format!("    t{} >> t{}", i - 1, i));
        }
    }

    lines.join("\n") + "\n"
}
