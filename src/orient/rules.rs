//! Local orientation rules over triples and short cycles.
//!
//! Notation: `set(a, b, m)` writes mark `m` at `b` on the edge `a - b`, and
//! `mark(a, b)` reads it. `*` stands for any mark.

use crate::types::{Endpoint, NodeId};
use super::Marker;

use Endpoint::{Arrow, Circle, Tail};

/// Ordered pairs of distinct neighbors of `b`.
fn neighbor_pairs(m: &Marker<'_>, b: NodeId) -> Vec<(NodeId, NodeId)> {
    let adjacent = m.graph.adjacent_nodes(b);
    let mut pairs = Vec::with_capacity(adjacent.len() * adjacent.len());
    for &a in &adjacent {
        for &c in &adjacent {
            if a != c {
                pairs.push((a, c));
            }
        }
    }
    pairs
}

fn nodes(m: &Marker<'_>) -> Vec<NodeId> {
    m.graph.node_ids().collect()
}

/// R1: `a *-> b o-* c`, `a` and `c` not adjacent ⇒ `b --> c`.
pub(crate) fn rule_r1(m: &mut Marker<'_>) {
    for b in nodes(m) {
        for (a, c) in neighbor_pairs(m, b) {
            if m.mark(a, b) != Some(Arrow) || m.mark(c, b) != Some(Circle) {
                continue;
            }
            if m.graph.is_adjacent(a, c) {
                continue;
            }
            m.set(c, b, Tail, "R1");
            m.set(b, c, Arrow, "R1");
        }
    }
}

/// R2: `a --> b *-> c` or `a *-> b --> c`, with `a *-o c` ⇒ `a *-> c`.
pub(crate) fn rule_r2(m: &mut Marker<'_>) {
    for b in nodes(m) {
        for (a, c) in neighbor_pairs(m, b) {
            if m.mark(a, c) != Some(Circle) {
                continue;
            }
            let through_a = m.mark(b, a) == Some(Tail) && m.mark(a, b) == Some(Arrow) && m.mark(b, c) == Some(Arrow);
            let through_c = m.mark(a, b) == Some(Arrow) && m.mark(c, b) == Some(Tail) && m.mark(b, c) == Some(Arrow);
            if through_a || through_c {
                m.set(a, c, Arrow, "R2");
            }
        }
    }
}

/// R3: `a *-> b <-* c`, `a *-o d o-* c`, `a` and `c` not adjacent, `d *-o b` ⇒ `d *-> b`.
pub(crate) fn rule_r3(m: &mut Marker<'_>) {
    for b in nodes(m) {
        let adjacent = m.graph.adjacent_nodes(b);
        for &d in &adjacent {
            if m.mark(d, b) != Some(Circle) {
                continue;
            }
            for (i, &a) in adjacent.iter().enumerate() {
                for &c in &adjacent[i + 1..] {
                    if a == d || c == d || m.graph.is_adjacent(a, c) {
                        continue;
                    }
                    let collider = m.mark(a, b) == Some(Arrow) && m.mark(c, b) == Some(Arrow);
                    let circles = m.mark(a, d) == Some(Circle) && m.mark(c, d) == Some(Circle);
                    if collider && circles {
                        m.set(d, b, Arrow, "R3");
                    }
                }
            }
        }
    }
}

/// R6: `a --- b o-* c` ⇒ `b --* c`.
pub(crate) fn rule_r6(m: &mut Marker<'_>) {
    for b in nodes(m) {
        for (a, c) in neighbor_pairs(m, b) {
            let undirected = m.mark(a, b) == Some(Tail) && m.mark(b, a) == Some(Tail);
            if undirected && m.mark(c, b) == Some(Circle) {
                m.set(c, b, Tail, "R6");
            }
        }
    }
}

/// R7: `a --o b o-* c`, `a` and `c` not adjacent ⇒ `b --* c`.
pub(crate) fn rule_r7(m: &mut Marker<'_>) {
    for b in nodes(m) {
        for (a, c) in neighbor_pairs(m, b) {
            let tail_circle = m.mark(b, a) == Some(Tail) && m.mark(a, b) == Some(Circle);
            if tail_circle && m.mark(c, b) == Some(Circle) && !m.graph.is_adjacent(a, c) {
                m.set(c, b, Tail, "R7");
            }
        }
    }
}

/// R8: `a --> b --> c` or `a --o b --> c`, with `a o-> c` ⇒ `a --> c`.
pub(crate) fn rule_r8(m: &mut Marker<'_>) {
    for b in nodes(m) {
        for (a, c) in neighbor_pairs(m, b) {
            if m.mark(c, a) != Some(Circle) || m.mark(a, c) != Some(Arrow) {
                continue;
            }
            let a_to_b = m.mark(b, a) == Some(Tail) && matches!(m.mark(a, b), Some(Arrow) | Some(Circle));
            let b_to_c = m.mark(c, b) == Some(Tail) && m.mark(b, c) == Some(Arrow);
            if a_to_b && b_to_c {
                m.set(c, a, Tail, "R8");
            }
        }
    }
}
