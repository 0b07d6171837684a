//! Schema-driven extraction from parsed bodies.
//!
//! [`content`] is strict: anything the schema does not declare is an error.
//! [`partial_content`] silently skips undeclared items, which lets rules with
//! unrelated schemas query the same body.

use super::{
    Attribute, Block, BodyContent, BodySchema, Diagnostic, Diagnostics, Expression, Range,
    SchemaMode, SourceFile,
};
use hcl::edit::structure::{Block as EditBlock, Body};
use hcl::edit::Span;
use std::collections::BTreeMap;

/// Extracts `body` strictly according to `schema`.
///
/// # Errors
///
/// Returns every diagnostic found: undeclared attributes or blocks, missing
/// required attributes and label count mismatches.
pub fn content(
    body: &Body,
    file: &SourceFile,
    schema: &BodySchema,
) -> Result<BodyContent, Diagnostics> {
    let mut diags = Diagnostics::new();
    let content = extract(body, file, schema, true, None, &mut diags);
    diags.into_result(content)
}

/// Extracts `body` according to `schema`, ignoring undeclared items.
///
/// # Errors
///
/// Returns diagnostics for missing required attributes and label count
/// mismatches.
pub fn partial_content(
    body: &Body,
    file: &SourceFile,
    schema: &BodySchema,
) -> Result<BodyContent, Diagnostics> {
    let mut diags = Diagnostics::new();
    let content = extract(body, file, schema, false, None, &mut diags);
    diags.into_result(content)
}

/// Extracts the body of one parsed block strictly. Missing required
/// arguments are reported at the block's definition.
///
/// # Errors
///
/// See [`content`].
pub fn block_content(
    block: &EditBlock,
    file: &SourceFile,
    schema: &BodySchema,
) -> Result<BodyContent, Diagnostics> {
    let mut diags = Diagnostics::new();
    let enclosing = def_range(block, file);
    let content = extract(&block.body, file, schema, true, Some(&enclosing), &mut diags);
    diags.into_result(content)
}

fn extract(
    body: &Body,
    file: &SourceFile,
    schema: &BodySchema,
    strict: bool,
    enclosing: Option<&Range>,
    diags: &mut Diagnostics,
) -> BodyContent {
    let mut content = BodyContent::default();

    if schema.mode == SchemaMode::JustAttributes {
        for attr in body.attributes() {
            let attr = to_attribute(attr, file);
            content.attributes.insert(attr.name.clone(), attr);
        }
        for block in body.blocks() {
            let type_name = block.ident.as_str();
            diags.push(
                Diagnostic::error(
                    format!("Unexpected \"{type_name}\" block"),
                    "Blocks are not allowed here.",
                )
                .with_subject(def_range(block, file)),
            );
        }
        return content;
    }

    let mut attributes = BTreeMap::new();
    for attr in body.attributes() {
        let name = attr.key.as_str();
        if schema.find_attribute(name).is_some() {
            let attr = to_attribute(attr, file);
            attributes.insert(attr.name.clone(), attr);
        } else if strict {
            diags.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named \"{name}\" is not expected here."),
                )
                .with_subject(file.range_of(attr.key.span().unwrap_or_default())),
            );
        }
    }
    for required in schema.attributes.iter().filter(|a| a.required) {
        if !attributes.contains_key(&required.name) {
            let subject = enclosing.cloned().unwrap_or_else(|| file.start_range());
            diags.push(
                Diagnostic::error(
                    "Missing required argument",
                    format!(
                        "The argument \"{}\" is required, but no definition was found.",
                        required.name
                    ),
                )
                .with_subject(subject),
            );
        }
    }
    content.attributes = attributes;

    for block in body.blocks() {
        let type_name = block.ident.as_str();
        let Some(block_schema) = schema.find_block(type_name) else {
            if strict {
                diags.push(
                    Diagnostic::error(
                        "Unsupported block type",
                        format!("Blocks of type \"{type_name}\" are not expected here."),
                    )
                    .with_subject(file.range_of(block.ident.span().unwrap_or_default())),
                );
            }
            continue;
        };

        let label_ranges: Vec<Range> = block
            .labels
            .iter()
            .map(|label| file.range_of(label.span().unwrap_or_default()))
            .collect();
        let def_range = def_range(block, file);
        let expected = block_schema.label_names.len();

        if block.labels.len() > expected {
            let subject = label_ranges.get(expected).cloned().unwrap_or_else(|| def_range.clone());
            diags.push(
                Diagnostic::error(
                    format!("Extraneous label for {type_name}"),
                    "No more labels are expected.",
                )
                .with_subject(subject),
            );
            continue;
        }
        if block.labels.len() < expected {
            diags.push(
                Diagnostic::error(
                    format!("Missing name for {type_name}"),
                    format!(
                        "All {type_name} blocks must have {expected} labels ({}).",
                        block_schema.label_names.join(", ")
                    ),
                )
                .with_subject(def_range),
            );
            continue;
        }

        let empty = BodySchema::default();
        let nested_schema = block_schema.body.as_ref().unwrap_or(&empty);
        let nested = extract(&block.body, file, nested_schema, strict, Some(&def_range), diags);

        content.blocks.push(Block {
            block_type: type_name.to_string(),
            labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
            body: nested,
            def_range,
            type_range: file.range_of(block.ident.span().unwrap_or_default()),
            label_ranges,
        });
    }

    content
}

fn to_attribute(attr: &hcl::edit::structure::Attribute, file: &SourceFile) -> Attribute {
    Attribute {
        name: attr.key.as_str().to_string(),
        expr: Expression::from_span(file, attr.value.span().unwrap_or_default()),
        range: file.range_of(attr.span().unwrap_or_default()),
        name_range: file.range_of(attr.key.span().unwrap_or_default()),
    }
}

fn def_range(block: &EditBlock, file: &SourceFile) -> Range {
    let type_span = block.ident.span().unwrap_or_default();
    let end = block
        .labels
        .last()
        .and_then(Span::span)
        .map_or(type_span.end, |span| span.end);
    file.range_of(type_span.start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::BlockSchema;

    fn parse(source: &str) -> (Body, SourceFile) {
        let file = SourceFile::new("main.tf", source);
        let body = file.parse().unwrap();
        (body, file)
    }

    fn summaries(diags: &Diagnostics) -> Vec<String> {
        diags.iter().map(|d| d.summary.clone()).collect()
    }

    // --- strict extraction tests ---

    #[test]
    fn test_content_extracts_declared_items() {
        let (body, file) = parse(
            r#"
resource "aws_instance" "web" {
  ami   = "ami-123"
  count = 2
}
"#,
        );
        let schema = BodySchema::new().block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(BodySchema::new().required("ami").attribute("count")),
        );
        let content = content(&body, &file, &schema).unwrap();
        assert!(content.attributes.is_empty());
        let block = &content.blocks[0];
        assert_eq!(block.labels, vec!["aws_instance", "web"]);
        assert_eq!(block.def_range.to_string(), "main.tf:2,1-30");
        assert_eq!(block.type_range.to_string(), "main.tf:2,1-9");
        assert_eq!(block.label_ranges[1].to_string(), "main.tf:2,25-30");
        assert_eq!(block.body.attributes["ami"].expr.source(), "\"ami-123\"");
        assert_eq!(block.body.attributes["count"].expr.source(), "2");
    }

    #[test]
    fn test_content_rejects_undeclared() {
        let (body, file) = parse("a = 1\nb = 2\nextra {}\n");
        let schema = BodySchema::new().attribute("a");
        let diags = content(&body, &file, &schema).unwrap_err();
        assert_eq!(
            summaries(&diags),
            vec!["Unsupported argument", "Unsupported block type"]
        );
        assert_eq!(
            diags.iter().next().unwrap().detail,
            "An argument named \"b\" is not expected here."
        );
    }

    #[test]
    fn test_content_missing_required() {
        let (body, file) = parse("block {}\n");
        let schema = BodySchema::new()
            .block(BlockSchema::new("block").body(BodySchema::new().required("name")));
        let diags = content(&body, &file, &schema).unwrap_err();
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Missing required argument");
        assert_eq!(diag.subject.as_ref().unwrap().to_string(), "main.tf:1,1-6");
    }

    #[test]
    fn test_nil_nested_schema_is_strict() {
        let (body, file) = parse("block {\n  a = 1\n}\n");
        let schema = BodySchema::new().block(BlockSchema::new("block"));
        assert!(content(&body, &file, &schema).is_err());
        let partial = partial_content(&body, &file, &schema).unwrap();
        assert!(partial.blocks[0].body.is_empty());
    }

    // --- label tests ---

    #[test]
    fn test_extraneous_label() {
        let (body, file) = parse("variable \"a\" \"b\" {}\n");
        let schema = BodySchema::new().block(BlockSchema::new("variable").labels(&["name"]));
        let diags = partial_content(&body, &file, &schema).unwrap_err();
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Extraneous label for variable");
        assert_eq!(diag.detail, "No more labels are expected.");
        assert_eq!(diag.subject.as_ref().unwrap().start.column, 14);
    }

    #[test]
    fn test_missing_label() {
        let (body, file) = parse("resource \"a\" {}\n");
        let schema =
            BodySchema::new().block(BlockSchema::new("resource").labels(&["type", "name"]));
        let diags = partial_content(&body, &file, &schema).unwrap_err();
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Missing name for resource");
        assert_eq!(
            diag.detail,
            "All resource blocks must have 2 labels (type, name)."
        );
    }

    // --- partial extraction tests ---

    #[test]
    fn test_partial_content_ignores_unknown() {
        let (body, file) = parse("a = 1\nb = 2\nextra {}\nkept {}\n");
        let schema = BodySchema::new().attribute("a").block(BlockSchema::new("kept"));
        let content = partial_content(&body, &file, &schema).unwrap();
        assert_eq!(content.attributes.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.blocks[0].block_type, "kept");
    }

    #[test]
    fn test_just_attributes() {
        let (body, file) = parse("x = 1\ny = \"two\"\n");
        let content = content(&body, &file, &BodySchema::just_attributes()).unwrap();
        assert_eq!(content.attributes.len(), 2);
        assert_eq!(content.attributes["y"].expr.source(), "\"two\"");

        let (body, file) = parse("x = 1\nnested {}\n");
        let diags = partial_content(&body, &file, &BodySchema::just_attributes()).unwrap_err();
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Unexpected \"nested\" block");
        assert_eq!(diag.detail, "Blocks are not allowed here.");
    }

    #[test]
    fn test_attribute_ranges() {
        let (body, file) = parse("name = var.x\n");
        let content = content(&body, &file, &BodySchema::new().attribute("name")).unwrap();
        let attr = &content.attributes["name"];
        assert_eq!(attr.range.to_string(), "main.tf:1,1-13");
        assert_eq!(attr.name_range.to_string(), "main.tf:1,1-5");
        assert_eq!(attr.expr.range().to_string(), "main.tf:1,8-13");
    }
}
