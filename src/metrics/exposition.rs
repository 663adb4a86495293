//! Prometheus text exposition (format 0.0.4) of a [`MetricsSnapshot`].

use std::fmt::Write;

use super::collector::{HistogramSnapshot, MetricsSnapshot};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn render(snapshot: &MetricsSnapshot, skipped_name: &str) -> String {
    let mut out = String::with_capacity(4096);

    histogram(&mut out, &snapshot.order_time, "Order submission to consumption time");
    histogram(&mut out, &snapshot.send_message_time, "Send message time");
    histogram(&mut out, &snapshot.receive_message_time, "Receive message time");
    histogram(&mut out, &snapshot.delete_message_time, "Delete message time");

    let _ = writeln!(out, "# HELP {skipped_name} Consumed messages without a latency observation");
    let _ = writeln!(out, "# TYPE {skipped_name} counter");
    for skip in &snapshot.skipped {
        let _ = writeln!(out, "{skipped_name}{{reason=\"{}\"}} {}", skip.reason, skip.count);
    }

    out
}

fn histogram(out: &mut String, h: &HistogramSnapshot, help: &str) {
    let name = &h.name;
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} histogram");
    for b in &h.buckets {
        let _ = writeln!(out, "{name}_bucket{{le=\"{}\"}} {}", b.le, b.count);
    }
    let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", h.count);
    let _ = writeln!(out, "{name}_sum {}", h.sum_secs);
    let _ = writeln!(out, "{name}_count {}", h.count);
}
