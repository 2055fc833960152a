use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{Industry, IndustryAggregation, TickerStatistic};

/// Mean over the present values; `None` when nothing is present.
fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> (Option<f64>, usize) {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    let mean = if count > 0 { Some(sum / count as f64) } else { None };
    (mean, count)
}

/// One aggregation row per industry present in `statistics`, ordered by industry.
pub fn aggregate_by_industry(statistics: &[TickerStatistic], at: DateTime<Utc>) -> Vec<IndustryAggregation> {
    let mut groups: BTreeMap<Industry, Vec<&TickerStatistic>> = BTreeMap::new();
    for stat in statistics {
        groups.entry(stat.industry).or_default().push(stat);
    }

    groups
        .into_iter()
        .map(|(industry, members)| {
            let (avg_pe_ratio, pe_ratio_count) = mean_of_present(members.iter().map(|s| s.pe_ratio));
            let (avg_revenue_growth, revenue_growth_count) =
                mean_of_present(members.iter().map(|s| s.revenue_growth));

            IndustryAggregation {
                industry,
                avg_pe_ratio,
                avg_revenue_growth,
                sum_revenue: members.iter().filter_map(|s| s.revenue_current).sum(),
                ticker_count: members.len(),
                pe_ratio_count,
                revenue_growth_count,
                last_updated: at,
            }
        })
        .collect()
}
