use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::warn;

use crate::error::{ConfigError, Result};

/// Appends documentation lines as TOML comments to the given `Decor`.
///
/// Each line becomes a `# ` comment. Existing prefix comments are kept, separated by an empty
/// comment line.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let old_prefix = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default()
        .to_owned();

    let comments: String = docs
        .lines()
        .map(|l| {
            if l.is_empty() {
                "#\n".into()
            } else {
                format!("# {l}\n")
            }
        })
        .collect();

    let separator = match old_prefix.lines().last() {
        None | Some("") => "",
        Some(_) => "#\n",
    };

    let mut prefix = old_prefix;
    if !prefix.is_empty() && !prefix.ends_with('\n') {
        prefix.push('\n');
    }
    decor.set_prefix(format!("{prefix}{separator}{comments}"));
}

/// Annotates a TOML `Table` with the field docs of `T`.
///
/// Non-root tables also receive the container doc of `T` above their header.
pub fn annotate_toml_table<T>(table: &mut Table, is_root: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if !is_root {
        append_docs_as_toml_comments(table.decor_mut(), T::DOCS);
    }

    for (mut key_mut, value_item) in table.iter_mut() {
        let key_str = key_mut.get();
        let Ok(docs) = T::get_field_docs(key_str) else {
            warn!(
                "Field '{}' found in TOML but not in struct '{}' for documentation lookup",
                key_str,
                type_name::<T>()
            );
            continue;
        };

        match value_item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(key_str.into())),
            Item::Value(_) => append_docs_as_toml_comments(key_mut.leaf_decor_mut(), docs),
            // sub-tables carry their own container docs
            Item::Table(_) | Item::ArrayOfTables(_) => {}
        }
    }

    Ok(())
}
