//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::io::format::format_unix_timestamp;
use crate::query::{IndexStats, ProductMatch};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Create a table of search matches, best first.
pub fn create_matches_table(matches: &[ProductMatch]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Product").add_attribute(Attribute::Bold),
        Cell::new("Brand").add_attribute(Attribute::Bold),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Category").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("URL").add_attribute(Attribute::Bold),
    ]);

    for (rank, m) in matches.iter().enumerate() {
        let color = if m.similarity_score >= 0.8 {
            Color::Green
        } else {
            Color::Yellow
        };
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{:.4}", m.similarity_score)).fg(color),
            Cell::new(m.product_id),
            Cell::new(&m.brand),
            Cell::new(&m.name),
            Cell::new(&m.category),
            Cell::new(format!("{:.2} {}", m.price, m.currency))
                .set_alignment(CellAlignment::Right),
            Cell::new(&m.product_url),
        ]);
    }

    table.to_string()
}

/// Create a two-column summary of index state.
pub fn create_stats_table(stats: &IndexStats) -> String {
    let mut builder = TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Products".to_string(), stats.products.to_string()])
        .add_row(vec!["Dimension".to_string(), stats.dimension.to_string()]);

    if let Some(path) = &stats.path {
        builder = builder.add_row(vec!["Path".to_string(), path.display().to_string()]);
    }
    if let Some(model) = &stats.model_name {
        builder = builder.add_row(vec!["Model".to_string(), model.clone()]);
    }
    if let Some(bytes) = stats.size_bytes {
        builder = builder.add_row(vec![
            "Size".to_string(),
            format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0)),
        ]);
    }
    if let Some(created) = stats.created_at {
        builder = builder.add_row(vec!["Created".to_string(), format_unix_timestamp(created)]);
    }
    if let Some(updated) = stats.updated_at {
        builder = builder.add_row(vec!["Updated".to_string(), format_unix_timestamp(updated)]);
    }

    builder.build()
}
