//! Deterministic per-connection display identity (part of C4's PlayerInfo).
//!
//! The same connection id always maps to the same color/animal/name triple,
//! computed by hashing the id into two fixed palette tables. No state is
//! kept: identity is a pure function of the id.

use crate::hash::hash_id;

pub const COLORS: [&str; 18] = [
    "crimson", "coral", "amber", "gold", "lime", "emerald", "teal", "cyan", "azure", "cobalt",
    "indigo", "violet", "magenta", "rose", "slate", "sand", "olive", "rust",
];

pub const ANIMALS: [&str; 73] = [
    "Aardvark", "Albatross", "Alpaca", "Antelope", "Armadillo", "Badger", "Barracuda", "Bat",
    "Beaver", "Bison", "Bobcat", "Buffalo", "Camel", "Caribou", "Cassowary", "Cheetah",
    "Chinchilla", "Cobra", "Condor", "Cougar", "Coyote", "Crane", "Crow", "Dingo", "Dolphin",
    "Dragonfly", "Eagle", "Egret", "Elk", "Falcon", "Ferret", "Finch", "Flamingo", "Fox",
    "Gazelle", "Gecko", "Gibbon", "Goose", "Grouse", "Hawk", "Hedgehog", "Heron", "Hornet",
    "Hyena", "Ibex", "Iguana", "Impala", "Jackal", "Jaguar", "Jay", "Kestrel", "Kingfisher",
    "Koala", "Kookaburra", "Lemur", "Leopard", "Lynx", "Magpie", "Manatee", "Marmot", "Marten",
    "Meerkat", "Mink", "Mongoose", "Moose", "Narwhal", "Newt", "Ocelot", "Orca", "Osprey",
    "Otter", "Owl", "Panther",
];

/// Deterministic {color, animal, name} identity for a connection id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub color: &'static str,
    pub animal: &'static str,
    pub name: String,
}

/// Derive a display identity from a connection id. Stable: the same id
/// string always produces the same identity.
pub fn identity_for(connection_id: &str) -> Identity {
    let h = hash_id(connection_id);
    let color = COLORS[(h as usize) % COLORS.len()];
    let animal = ANIMALS[((h >> 8) as usize) % ANIMALS.len()];
    Identity {
        color,
        animal,
        name: format!("{} {}", capitalize(color), animal),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic() {
        let a = identity_for("connection-1");
        let b = identity_for("connection-1");
        assert_eq!(a, b);
    }

    #[test]
    fn different_ids_usually_differ() {
        let a = identity_for("connection-1");
        let b = identity_for("connection-2");
        assert!(a.color != b.color || a.animal != b.animal);
    }
}
