use std::fmt;

use crate::dashboard::{DashboardOutput, ViewResult};

/// `1234567.8` → `1,234,568`
pub fn thousands(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

/// Plain-text rendering of one dashboard evaluation.
pub fn render(output: &DashboardOutput) -> String {
    Report(output).to_string()
}

/// Text layout of a [`DashboardOutput`]: KPI lines, then one table per view.
pub struct Report<'a>(pub &'a DashboardOutput);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = &self.0.kpis;
        writeln!(f, "Total Revenue   ${}", thousands(k.total_revenue))?;
        writeln!(f, "Total Profit    ${}", thousands(k.total_profit))?;
        writeln!(f, "Average Margin  {:.1}%", k.margin_pct)?;
        writeln!(f, "Transactions    {}", k.records)?;

        for view in &self.0.views {
            writeln!(f)?;
            write_view(f, view)?;
        }
        Ok(())
    }
}

fn write_view(f: &mut fmt::Formatter<'_>, view: &ViewResult) -> fmt::Result {
    writeln!(f, "== {} ({})", view.title, view.group_by.join(", "))?;

    let width = view
        .rows
        .iter()
        .map(|r| r.label().len())
        .max()
        .unwrap_or(0)
        .max(8);

    write!(f, "{:width$}", "")?;
    for col in &view.columns {
        write!(f, "  {col:>14}")?;
    }
    writeln!(f)?;

    for row in &view.rows {
        write!(f, "{:width$}", row.label())?;
        for col in &view.columns {
            let cell = match row.value(col) {
                Some(v) if view.ratios.contains(col) => format!("{:.1}%", v * 100.0),
                Some(v) => thousands(v),
                None => String::new(),
            };
            write!(f, "  {cell:>14}")?;
        }
        writeln!(f)?;
    }
    Ok(())
}
