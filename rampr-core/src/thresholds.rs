use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl ThresholdOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn holds(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
            Self::Ne => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Count,
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.agg, self.op.as_str(), self.value)
    }
}

/// Parses `<agg> <op> <number>`, e.g. `p(95)<800` or `rate < 0.01`.
pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in threshold: {raw}"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("threshold value must be finite: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ThresholdExpr {
        parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn parses_health_check_thresholds() {
        let rate = parse("rate<0.01");
        assert_eq!(rate.agg, ThresholdAgg::Rate);
        assert_eq!(rate.op, ThresholdOp::Lt);
        assert_eq!(rate.value, 0.01);

        let p95 = parse("p(95)<800");
        assert_eq!(p95.agg, ThresholdAgg::P(95.0));
        assert_eq!(p95.value, 800.0);
    }

    #[test]
    fn trims_whitespace_and_ignores_case() {
        let expr = parse("  AVG  <=  123  ");
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn supports_fractional_percentiles_and_not_equal() {
        let expr = parse("p(99.9) != 0");
        assert_eq!(expr.agg, ThresholdAgg::P(99.9));
        assert_eq!(expr.op, ThresholdOp::Ne);
        assert_eq!(expr.to_string(), "p(99.9)!=0");
    }

    #[test]
    fn aggregations_display_the_way_they_parse() {
        for raw in ["count", "rate", "value", "avg", "min", "max", "med", "p(95)", "p(99.9)"] {
            let agg = parse(&format!("{raw}>0")).agg;
            assert_eq!(agg.to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for raw in [
            "",
            "p(95)",
            "<800",
            "p(95)<",
            "p95<800",
            "p(0)<1",
            "p(101)<1",
            "median<3",
            "avg<abc",
            "avg<inf",
        ] {
            assert!(
                parse_threshold_expr(raw).is_err(),
                "expected `{raw}` to be rejected"
            );
        }
    }

    #[test]
    fn ops_compare_as_expected() {
        assert!(ThresholdOp::Lt.holds(1.0, 2.0));
        assert!(!ThresholdOp::Lt.holds(2.0, 2.0));
        assert!(ThresholdOp::Lte.holds(2.0, 2.0));
        assert!(ThresholdOp::Gte.holds(2.0, 2.0));
        assert!(ThresholdOp::Eq.holds(0.0, 0.0));
        assert!(ThresholdOp::Ne.holds(0.5, 0.0));
        assert!(ThresholdOp::Gt.holds(3.0, 2.0));
    }
}
