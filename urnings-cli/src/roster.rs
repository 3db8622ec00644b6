/// Synthetic rosters for simulation runs.
use rand::Rng;
use urnings_core::{Entity, UrningsError};

/// True values are drawn uniformly from this range.
pub const TRUE_VALUE_RANGE: (f64, f64) = (0.1, 0.9);

#[derive(Debug, Clone, Copy)]
pub struct RosterSpec {
    pub players: usize,
    pub items: usize,
    pub player_urn: u32,
    pub item_urn: u32,
}

/// Players get IDs `0..players`, items `0..items`. Every urn starts half full.
pub fn generate(spec: &RosterSpec, rng: &mut impl Rng) -> Result<(Vec<Entity>, Vec<Entity>), UrningsError> {
    let players = (0..spec.players)
        .map(|k| half_full(k as i64, spec.player_urn, rng))
        .collect::<Result<Vec<_>, _>>()?;
    let items = (0..spec.items)
        .map(|k| half_full(k as i64, spec.item_urn, rng))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((players, items))
}

fn half_full(id: i64, urn_size: u32, rng: &mut impl Rng) -> Result<Entity, UrningsError> {
    let (low, high) = TRUE_VALUE_RANGE;
    Entity::new(id, urn_size / 2, urn_size, rng.random_range(low..=high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_half_full_roster() {
        let spec = RosterSpec { players: 5, items: 7, player_urn: 16, item_urn: 9 };
        let mut rng = SmallRng::seed_from_u64(1);
        let (players, items) = generate(&spec, &mut rng).unwrap();
        assert_eq!(players.len(), 5);
        assert_eq!(items.len(), 7);
        assert!(players.iter().all(|p| p.score() == 8 && p.urn_size() == 16));
        assert!(items.iter().all(|it| it.score() == 4 && it.urn_size() == 9));
        for e in players.iter().chain(&items) {
            assert!((0.1..=0.9).contains(&e.true_value()));
        }
        assert_eq!(items.last().unwrap().id(), 6);
    }

    #[test]
    fn test_zero_urn_is_rejected() {
        let spec = RosterSpec { players: 1, items: 1, player_urn: 0, item_urn: 8 };
        let mut rng = SmallRng::seed_from_u64(2);
        assert!(matches!(generate(&spec, &mut rng), Err(UrningsError::InvalidUrnSize { id: 0 })));
    }

    #[test]
    fn test_same_seed_same_roster() {
        let spec = RosterSpec { players: 3, items: 3, player_urn: 8, item_urn: 8 };
        let a = generate(&spec, &mut SmallRng::seed_from_u64(3)).unwrap();
        let b = generate(&spec, &mut SmallRng::seed_from_u64(3)).unwrap();
        let values = |(p, i): &(Vec<Entity>, Vec<Entity>)| {
            p.iter().chain(i).map(Entity::true_value).collect::<Vec<_>>()
        };
        assert_eq!(values(&a), values(&b));
    }
}
