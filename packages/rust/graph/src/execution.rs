//! Execution diagnostics returned alongside the final state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use scrapegraph_shared::{RunId, Usage};

/// Lifecycle of one graph execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStatus {
    Built,
    Running,
    Completed,
    Failed,
}

/// Timing and usage for one node invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeExecution {
    pub node: String,
    pub elapsed_ms: u64,
    pub usage: Usage,
}

/// Diagnostic record for a completed run. Opaque to control flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionInfo {
    pub run_id: RunId,
    pub graph: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Node that short-circuited the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<String>,
    /// Invoked nodes, in execution order.
    pub nodes: Vec<NodeExecution>,
}

impl ExecutionInfo {
    pub(crate) fn new(run_id: RunId, graph: &str) -> Self {
        Self {
            run_id,
            graph: graph.to_string(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            halted_at: None,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, node: &str, elapsed: Duration, usage: Usage) {
        self.nodes.push(NodeExecution {
            node: node.to_string(),
            elapsed_ms: duration_ms(elapsed),
            usage,
        });
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = duration_ms(elapsed);
    }

    /// Usage summed over every node.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for node in &self.nodes {
            total += node.usage;
        }
        total
    }

    /// Plain-text table, one row per node plus a total row.
    pub fn to_table(&self) -> String {
        const HEADER: [&str; 6] = [
            "node",
            "total_tokens",
            "prompt_tokens",
            "completion_tokens",
            "requests",
            "exec_time_s",
        ];

        let mut rows: Vec<[String; 6]> = self
            .nodes
            .iter()
            .map(|n| table_row(&n.node, &n.usage, n.elapsed_ms))
            .collect();
        rows.push(table_row("TOTAL", &self.total_usage(), self.elapsed_ms));

        let mut widths = HEADER.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        let header = HEADER.map(String::from);
        for row in std::iter::once(&header).chain(rows.iter()) {
            let line: Vec<String> = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }
        out
    }
}

fn table_row(name: &str, usage: &Usage, elapsed_ms: u64) -> [String; 6] {
    [
        name.to_string(),
        usage.total_tokens.to_string(),
        usage.prompt_tokens.to_string(),
        usage.completion_tokens.to_string(),
        usage.requests.to_string(),
        format!("{:.3}", elapsed_ms as f64 / 1000.0),
    ]
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionInfo {
        let mut info = ExecutionInfo::new(RunId::new(), "json_scraper");
        info.record("fetch", Duration::from_millis(12), Usage::default());
        info.record(
            "generate_answer",
            Duration::from_millis(1500),
            Usage {
                prompt_tokens: 900,
                completion_tokens: 100,
                total_tokens: 1000,
                requests: 1,
            },
        );
        info.finish(Duration::from_millis(1520));
        info
    }

    #[test]
    fn totals_sum_node_usage() {
        let info = sample();
        let total = info.total_usage();
        assert_eq!(total.total_tokens, 1000);
        assert_eq!(total.requests, 1);
        assert_eq!(info.elapsed_ms, 1520);
    }

    #[test]
    fn table_has_row_per_node_plus_total() {
        let table = sample().to_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("node"));
        assert!(lines[1].starts_with("fetch"));
        assert!(lines[2].contains("1000"));
        assert!(lines[3].starts_with("TOTAL"));
        assert!(lines[3].contains("1.520"));
        assert!(table.ends_with('\n'));
        assert!(lines.iter().all(|line| line == &line.trim_end()));
    }

    #[test]
    fn serializes_without_empty_halt() {
        let value = serde_json::to_value(sample()).expect("serialize");
        assert!(value.get("halted_at").is_none());
        assert_eq!(value["nodes"][1]["usage"]["total_tokens"], 1000);
    }
}
