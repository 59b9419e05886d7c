//! Stored objects: solids and combinations.

use rtcsg_math::Transform;
use rtcsg_prim::GeometryRecord;
use serde::{Deserialize, Serialize};

/// Boolean operator joining two subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    /// Material in either operand.
    Union,
    /// Material in both operands.
    Intersect,
    /// Material in the left operand but not the right.
    Subtract,
}

/// Boolean expression tree of a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum CombTree {
    /// Reference to a named object, optionally placed by a matrix.
    Leaf {
        /// Referenced object.
        name: String,
        /// Placement applied to the referenced object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        matrix: Option<Transform>,
    },
    /// Operator node.
    Op {
        /// Operator.
        op: BoolOp,
        /// Left operand.
        left: Box<CombTree>,
        /// Right operand.
        right: Box<CombTree>,
    },
}

impl CombTree {
    /// Unplaced reference to `name`.
    pub fn leaf(name: impl Into<String>) -> Self {
        CombTree::Leaf {
            name: name.into(),
            matrix: None,
        }
    }

    /// Reference to `name` placed by `matrix`.
    pub fn placed(name: impl Into<String>, matrix: Transform) -> Self {
        CombTree::Leaf {
            name: name.into(),
            matrix: Some(matrix),
        }
    }

    /// `op(left, right)`.
    pub fn op(op: BoolOp, left: CombTree, right: CombTree) -> Self {
        CombTree::Op {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left ∪ right`.
    pub fn union(left: CombTree, right: CombTree) -> Self {
        Self::op(BoolOp::Union, left, right)
    }

    /// `left ∩ right`.
    pub fn intersect(left: CombTree, right: CombTree) -> Self {
        Self::op(BoolOp::Intersect, left, right)
    }

    /// `left - right`.
    pub fn subtract(left: CombTree, right: CombTree) -> Self {
        Self::op(BoolOp::Subtract, left, right)
    }

    /// Leaf references in left-to-right order.
    ///
    /// Each child carries the operator that joins it to what precedes it;
    /// the first child is always a union.
    pub fn children(&self) -> Vec<ChildRef> {
        let mut out = Vec::new();
        self.collect_children(BoolOp::Union, &mut out);
        out
    }

    fn collect_children(&self, op: BoolOp, out: &mut Vec<ChildRef>) {
        match self {
            CombTree::Leaf { name, matrix } => out.push(ChildRef {
                name: name.clone(),
                op,
                matrix: matrix.clone(),
            }),
            CombTree::Op {
                op: inner,
                left,
                right,
            } => {
                left.collect_children(op, out);
                right.collect_children(*inner, out);
            }
        }
    }

    /// Visit every leaf mutably, in the same order as [`children`](Self::children).
    pub fn for_each_leaf_mut(&mut self, f: &mut impl FnMut(&str, &mut Option<Transform>)) {
        match self {
            CombTree::Leaf { name, matrix } => f(name, matrix),
            CombTree::Op { left, right, .. } => {
                left.for_each_leaf_mut(f);
                right.for_each_leaf_mut(f);
            }
        }
    }
}

/// One flattened reference from a combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRef {
    /// Referenced object.
    pub name: String,
    /// Operator joining this child to the preceding ones.
    pub op: BoolOp,
    /// Placement on the reference.
    pub matrix: Option<Transform>,
}

/// Attributes that make a combination a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegionAttrs {
    /// Region identifier.
    pub id: i32,
    /// Non-zero for air.
    #[serde(default)]
    pub aircode: i32,
}

impl RegionAttrs {
    /// Whether the region is air.
    pub fn is_air(&self) -> bool {
        self.aircode != 0
    }
}

/// A named boolean combination of other objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    /// Present when the combination is a region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionAttrs>,
    /// Expression tree.
    pub tree: CombTree,
}

impl Combination {
    /// Plain (non-region) combination.
    pub fn new(tree: CombTree) -> Self {
        Self { region: None, tree }
    }

    /// Region with the given id.
    pub fn region(id: i32, tree: CombTree) -> Self {
        Self {
            region: Some(RegionAttrs { id, aircode: 0 }),
            tree,
        }
    }

    /// Air region with the given id and air code.
    pub fn air(id: i32, aircode: i32, tree: CombTree) -> Self {
        Self {
            region: Some(RegionAttrs { id, aircode }),
            tree,
        }
    }

    /// Whether the combination carries region attributes.
    pub fn is_region(&self) -> bool {
        self.region.is_some()
    }

    /// Flattened references.
    pub fn children(&self) -> Vec<ChildRef> {
        self.tree.children()
    }
}

/// Anything the store holds under a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbObject {
    /// Primitive geometry.
    Solid(GeometryRecord),
    /// Combination or region.
    Comb(Combination),
}

impl DbObject {
    /// Solids are the leaves of every tree.
    pub fn is_leaf(&self) -> bool {
        matches!(self, DbObject::Solid(_))
    }

    /// The combination, if this is one.
    pub fn as_comb(&self) -> Option<&Combination> {
        match self {
            DbObject::Comb(c) => Some(c),
            DbObject::Solid(_) => None,
        }
    }
}
