use std::fmt::Write;

use crate::report::{Report, ResourceNode, VersionNode, VersionReport};


const INDENT: &str = "  ";


fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}


/// Renders the report as indented plain text.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_report(&mut out, report);
    out
}


fn write_report(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "File: {}", report.path)?;
    writeln!(out, "Machine: {}", report.machine)?;
    writeln!(out, "Format: {}", report.format)?;
    writeln!(out, "Subsystem: {}", report.subsystem)?;
    writeln!(out, "Characteristics: {:?}", report.characteristics)?;
    writeln!(out, "DLL characteristics: {:?}", report.dll_characteristics)?;
    writeln!(out, "Entry point: {}", report.entry_point)?;
    writeln!(out, "Image base: {:#x}", report.image_base)?;
    writeln!(out, "Symbol table: {} ({} symbols)", report.symbol_table, report.symbol_count)?;
    writeln!(out, "String table: {}", report.string_table)?;
    writeln!(out, "Section table: {} ({} sections)", report.section_table, report.sections.len())?;

    writeln!(out)?;
    writeln!(out, "Sections:")?;
    for section in &report.sections {
        indent(out, 1);
        write!(
            out,
            "{:<8} virtual {} file {}",
            section.name, section.virtual_range, section.file_range,
        )?;
        if let Some(error) = &section.error {
            write!(out, " ({})", error)?;
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "Data directories:")?;
    for directory in &report.data_directories {
        indent(out, 1);
        match &directory.location {
            Some(location) => writeln!(out, "{}: {}", directory.name, location)?,
            None => writeln!(out, "{}: absent", directory.name)?,
        }
    }

    if let Some(resources) = &report.resources {
        writeln!(out)?;
        writeln!(out, "Resources:")?;
        for node in resources {
            write_resource_node(out, node, 1)?;
        }
    }
    for error in &report.resource_errors {
        writeln!(out, "Resource error: {}", error)?;
    }

    for version in &report.versions {
        writeln!(out)?;
        write_version(out, version)?;
    }
    Ok(())
}


fn write_resource_node(out: &mut String, node: &ResourceNode, level: usize) -> std::fmt::Result {
    indent(out, level);
    write!(out, "{}", node.id)?;
    if let Some(leaf) = &node.leaf {
        write!(out, ": data at {}, code page {}", leaf.range, leaf.code_page)?;
    }
    if let Some(error) = &node.error {
        write!(out, " ({})", error)?;
    }
    writeln!(out)?;
    for child in &node.children {
        write_resource_node(out, child, level + 1)?;
    }
    Ok(())
}


fn write_version(out: &mut String, version: &VersionReport) -> std::fmt::Result {
    writeln!(out, "Version info {} / {}:", version.name, version.language)?;
    indent(out, 1);
    writeln!(out, "Size: {} bytes", version.size)?;
    if let Some(key) = &version.key {
        indent(out, 1);
        writeln!(out, "Key: {}", key)?;
    }
    if let Some(file_version) = &version.file_version {
        indent(out, 1);
        writeln!(out, "File version: {}", file_version)?;
    }
    if let Some(product_version) = &version.product_version {
        indent(out, 1);
        writeln!(out, "Product version: {}", product_version)?;
    }
    if !version.translations.is_empty() {
        indent(out, 1);
        writeln!(out, "Translations: {}", version.translations.join(", "))?;
    }
    for node in &version.tree {
        write_version_node(out, node, 1)?;
    }
    for error in &version.errors {
        indent(out, 1);
        writeln!(out, "Error: {}", error)?;
    }
    Ok(())
}


fn write_version_node(out: &mut String, node: &VersionNode, level: usize) -> std::fmt::Result {
    indent(out, level);
    write!(out, "{}", node.key)?;
    if let Some(text) = &node.text {
        write!(out, ": {}", text)?;
    } else if let Some(binary) = &node.binary {
        write!(out, ": [{}]", binary)?;
    }
    if let Some(error) = &node.error {
        write!(out, " ({})", error)?;
    }
    writeln!(out)?;
    for child in &node.children {
        write_version_node(out, child, level + 1)?;
    }
    Ok(())
}
