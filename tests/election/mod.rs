mod enforce_leader;
mod leader_failover;
