//! Ranking and aggregate views over the player set.

use super::types::{GameStats, LeaderboardEntry, Player};

/// Top `limit` players by actions taken. Ties go to the deeper player, then to the id.
pub fn leaderboard(players: &[Player], limit: usize, start_position: u32) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&Player> = players.iter().collect();
    ranked.sort_by(|a, b| {
        b.total_actions
            .cmp(&a.total_actions)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i + 1,
            player_id: p.id.clone(),
            display_name: p.display_name.clone(),
            total_actions: p.total_actions,
            position: p.position,
            depth: p.depth(start_position),
            currency: p.currency,
        })
        .collect()
}

pub fn stats(players: &[Player], start_position: u32) -> GameStats {
    if players.is_empty() {
        return GameStats::default();
    }
    let total_depth: u64 = players.iter().map(|p| p.depth(start_position) as u64).sum();
    let n = players.len() as u64;
    GameStats {
        total_players: players.len(),
        total_actions: players.iter().map(|p| p.total_actions).sum(),
        average_depth: ((total_depth + n / 2) / n) as u32,
        players_at_goal: players.iter().filter(|p| p.at_goal()).count(),
    }
}

/// First player to have reached the goal, judged by when they last acted.
pub fn winner(players: &[Player]) -> Option<&Player> {
    players
        .iter()
        .filter(|p| p.at_goal())
        .min_by(|a, b| a.last_action_at.cmp(&b.last_action_at).then_with(|| a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, position: u32, actions: u64) -> Player {
        let mut p = Player::new(id, id, 3000);
        p.position = position;
        p.total_actions = actions;
        p
    }

    #[test]
    fn ranks_by_actions_then_depth() {
        let players = vec![
            player("a", 2900, 10),
            player("b", 2500, 40),
            player("c", 2800, 10),
            player("d", 3000, 0),
        ];
        let board = leaderboard(&players, 3, 3000);
        let ids: Vec<&str> = board.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].depth, 500);
    }

    #[test]
    fn stats_round_average_depth() {
        let players = vec![player("a", 2999, 1), player("b", 2998, 2), player("c", 0, 9)];
        let s = stats(&players, 3000);
        assert_eq!(s.total_players, 3);
        assert_eq!(s.total_actions, 12);
        // (1 + 2 + 3000) / 3 = 1001
        assert_eq!(s.average_depth, 1001);
        assert_eq!(s.players_at_goal, 1);
        assert_eq!(stats(&[], 3000), GameStats::default());
    }

    #[test]
    fn winner_is_earliest_finisher() {
        let mut late = player("late", 0, 5);
        late.last_action_at = 2_000;
        let mut early = player("early", 0, 9);
        early.last_action_at = 1_000;
        let players = vec![late, player("x", 10, 50), early];
        assert_eq!(winner(&players).map(|p| p.id.as_str()), Some("early"));
        assert!(winner(&[player("x", 10, 1)]).is_none());
    }
}
