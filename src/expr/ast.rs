//! Abstract Syntax Tree for cell expressions

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Built-in coordinate and sheet variables (`$row`, `$col`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Row,
    Col,
    N,
    QRow,
    QCol,
    End,
    Sheet,
    Filename,
    Left,
    Right,
    Top,
    Bottom,
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "row" => Self::Row,
            "col" => Self::Col,
            "n" => Self::N,
            "qrow" => Self::QRow,
            "qcol" => Self::QCol,
            "end" => Self::End,
            "sheet" => Self::Sheet,
            "filename" => Self::Filename,
            "left" => Self::Left,
            "right" => Self::Right,
            "top" => Self::Top,
            "bottom" => Self::Bottom,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Col => "col",
            Self::N => "n",
            Self::QRow => "qrow",
            Self::QCol => "qcol",
            Self::End => "end",
            Self::Sheet => "sheet",
            Self::Filename => "filename",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    /// Region boundary variables, only bound while resolving a region
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::Left | Self::Right | Self::Top | Self::Bottom)
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.name())
    }
}

/// Which cell accessor produced a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// `value[...]` - raw cell text
    Value,
    /// `item[...]` - wikified entity for the cell
    Item,
}

/// One index of a cell reference: a single position or an inclusive span
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Box<Expr>),
    Span(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    /// Column letters such as `A` or `AB`, evaluated as 1-indexed column numbers
    Column(usize),
    Var(Variable),
    CellRef {
        accessor: Accessor,
        col: Index,
        row: Index,
        /// Optional wikification context for `item[col, row, "context"]`
        context: Option<Box<Expr>>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `lhs -> rhs`: rhs when lhs is truthy, otherwise false
    Guard(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Visit every variable referenced by this expression
    pub fn visit_variables(&self, f: &mut impl FnMut(Variable)) {
        match self {
            Expr::Var(v) => f(*v),
            Expr::Number(_) | Expr::String(_) | Expr::Bool(_) | Expr::Column(_) => {}
            Expr::CellRef {
                col, row, context, ..
            } => {
                for index in [col, row] {
                    match index {
                        Index::Single(e) => e.visit_variables(f),
                        Index::Span(a, b) => {
                            a.visit_variables(f);
                            b.visit_variables(f);
                        }
                    }
                }
                if let Some(ctx) = context {
                    ctx.visit_variables(f);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit_variables(f);
                }
            }
            Expr::Unary(_, e) => e.visit_variables(f),
            Expr::Binary(_, a, b) | Expr::Guard(a, b) => {
                a.visit_variables(f);
                b.visit_variables(f);
            }
        }
    }

    /// Whether the expression mentions `var` anywhere
    pub fn references(&self, var: Variable) -> bool {
        let mut found = false;
        self.visit_variables(&mut |v| found |= v == var);
        found
    }
}
