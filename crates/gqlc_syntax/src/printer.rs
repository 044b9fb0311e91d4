//! Prints documents back to GraphQL source text.

use crate::ast::*;

/// Printing options.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    /// Number of spaces for indentation.
    pub indent_size: usize,
    /// Use tabs instead of spaces.
    pub use_tabs: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            indent_size: 2,
            use_tabs: false,
        }
    }
}

/// Document printer.
pub struct Printer {
    options: PrintOptions,
    output: String,
    indent: usize,
}

impl Printer {
    /// Creates a new printer.
    pub fn new(options: PrintOptions) -> Self {
        Self {
            options,
            output: String::new(),
            indent: 0,
        }
    }

    /// Prints a document. Definitions are separated by a blank line.
    pub fn print(&mut self, document: &Document) -> String {
        self.output.clear();
        self.indent = 0;

        for (i, def) in document.definitions.iter().enumerate() {
            if i > 0 {
                self.output.push_str("\n\n");
            }
            match def {
                Definition::Operation(op) => self.print_operation(op),
                Definition::Fragment(frag) => self.print_fragment(frag),
            }
        }

        std::mem::take(&mut self.output)
    }

    fn print_operation(&mut self, op: &OperationDefinition) {
        let anonymous_shorthand = op.operation == OperationType::Query
            && op.name.is_none()
            && op.variables.is_empty()
            && op.directives.is_empty();

        if !anonymous_shorthand {
            self.output.push_str(op.operation.as_str());
            if let Some(name) = &op.name {
                self.output.push(' ');
                self.output.push_str(&name.value);
            }
            if !op.variables.is_empty() {
                self.output.push('(');
                for (i, var) in op.variables.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.output.push('$');
                    self.output.push_str(&var.name.value);
                    self.output.push_str(": ");
                    self.output.push_str(&var.ty.to_string());
                    if let Some(default) = &var.default_value {
                        self.output.push_str(" = ");
                        self.print_value(default);
                    }
                    self.print_directives(&var.directives);
                }
                self.output.push(')');
            }
            self.print_directives(&op.directives);
            self.output.push(' ');
        }

        self.print_selection_set(&op.selection_set);
    }

    fn print_fragment(&mut self, frag: &FragmentDefinition) {
        self.output.push_str("fragment ");
        self.output.push_str(&frag.name.value);
        self.output.push_str(" on ");
        self.output.push_str(&frag.type_condition.value);
        self.print_directives(&frag.directives);
        self.output.push(' ');
        self.print_selection_set(&frag.selection_set);
    }

    fn print_selection_set(&mut self, selection_set: &SelectionSet) {
        self.output.push_str("{\n");
        self.indent += 1;
        for selection in &selection_set.selections {
            self.push_indent();
            self.print_selection(selection);
            self.output.push('\n');
        }
        self.indent -= 1;
        self.push_indent();
        self.output.push('}');
    }

    fn print_selection(&mut self, selection: &Selection) {
        match selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    self.output.push_str(&alias.value);
                    self.output.push_str(": ");
                }
                self.output.push_str(&field.name.value);
                self.print_arguments(&field.arguments);
                self.print_directives(&field.directives);
                if let Some(selection_set) = &field.selection_set {
                    self.output.push(' ');
                    self.print_selection_set(selection_set);
                }
            }
            Selection::FragmentSpread(spread) => {
                self.output.push_str("...");
                self.output.push_str(&spread.name.value);
                self.print_directives(&spread.directives);
            }
            Selection::InlineFragment(inline) => {
                self.output.push_str("...");
                if let Some(condition) = &inline.type_condition {
                    self.output.push_str(" on ");
                    self.output.push_str(&condition.value);
                }
                self.print_directives(&inline.directives);
                self.output.push(' ');
                self.print_selection_set(&inline.selection_set);
            }
        }
    }

    fn print_arguments(&mut self, arguments: &[Argument]) {
        if arguments.is_empty() {
            return;
        }
        self.output.push('(');
        for (i, arg) in arguments.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.output.push_str(&arg.name.value);
            self.output.push_str(": ");
            self.print_value(&arg.value);
        }
        self.output.push(')');
    }

    fn print_directives(&mut self, directives: &[Directive]) {
        for directive in directives {
            self.output.push_str(" @");
            self.output.push_str(&directive.name.value);
            self.print_arguments(&directive.arguments);
        }
    }

    fn print_value(&mut self, value: &Value) {
        match value {
            Value::Variable(name) => {
                self.output.push('$');
                self.output.push_str(&name.value);
            }
            Value::Int(n, _) => self.output.push_str(&n.to_string()),
            // Debug formatting keeps the fractional part, so the value re-lexes as a float.
            Value::Float(n, _) => self.output.push_str(&format!("{n:?}")),
            Value::String(s, _) => self.print_string(s),
            Value::Boolean(b, _) => self.output.push_str(if *b { "true" } else { "false" }),
            Value::Null(_) => self.output.push_str("null"),
            Value::Enum(name) => self.output.push_str(&name.value),
            Value::List(items, _) => {
                self.output.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.print_value(item);
                }
                self.output.push(']');
            }
            Value::Object(fields, _) => {
                self.output.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.output.push_str(&name.value);
                    self.output.push_str(": ");
                    self.print_value(value);
                }
                self.output.push('}');
            }
        }
    }

    fn print_string(&mut self, s: &str) {
        self.output.push('"');
        for c in s.chars() {
            match c {
                '"' => self.output.push_str("\\\""),
                '\\' => self.output.push_str("\\\\"),
                '\n' => self.output.push_str("\\n"),
                '\r' => self.output.push_str("\\r"),
                '\t' => self.output.push_str("\\t"),
                c if c.is_control() => {
                    self.output.push_str(&format!("\\u{:04X}", c as u32));
                }
                c => self.output.push(c),
            }
        }
        self.output.push('"');
    }

    fn push_indent(&mut self) {
        if self.options.use_tabs {
            for _ in 0..self.indent {
                self.output.push('\t');
            }
        } else {
            for _ in 0..(self.indent * self.options.indent_size) {
                self.output.push(' ');
            }
        }
    }
}

/// Prints a document with default options.
pub fn print(document: &Document) -> String {
    Printer::new(PrintOptions::default()).print(document)
}
