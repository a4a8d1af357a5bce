mod old_leader_commit;
mod old_leader_not_commit;
